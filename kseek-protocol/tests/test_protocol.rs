use std::io::Cursor;

use kseek_protocol::frame::{read_frame, write_frame, FRAME_MAGIC, MSG_VERSION};
use kseek_protocol::messages::*;
use kseek_protocol::wire::*;
use kseek_protocol::{MsgType, ProtocolError, FRAME_HEADER_SIZE, MAX_PAYLOAD_SIZE};

#[test]
fn frame_round_trip() {
    let payload = b"hello index".to_vec();
    let mut buf = Vec::new();
    write_frame(&mut buf, MsgType::SearchRequest, &payload).unwrap();
    assert_eq!(buf.len(), FRAME_HEADER_SIZE + payload.len());

    let (header, got) = read_frame(&mut Cursor::new(&buf)).unwrap();
    assert_eq!(header.msg_type, MsgType::SearchRequest);
    assert_eq!(header.msg_version, MSG_VERSION);
    assert_eq!(header.payload_length, payload.len() as u32);
    assert_eq!(got, payload);
}

#[test]
fn empty_payload_frames() {
    let mut buf = Vec::new();
    write_frame(&mut buf, MsgType::HealthRequest, &[]).unwrap();
    let (header, payload) = read_frame(&mut Cursor::new(&buf)).unwrap();
    assert_eq!(header.payload_length, 0);
    assert!(payload.is_empty());
}

#[test]
fn bad_magic_is_rejected() {
    let mut buf = Vec::new();
    write_frame(&mut buf, MsgType::HealthRequest, &[]).unwrap();
    buf[0] ^= 0xFF;
    assert!(matches!(
        read_frame(&mut Cursor::new(&buf)),
        Err(ProtocolError::BadMagic { .. })
    ));
}

#[test]
fn bad_version_is_rejected() {
    let mut buf = Vec::new();
    write_frame(&mut buf, MsgType::HealthRequest, &[]).unwrap();
    buf[9] = MSG_VERSION + 1;
    assert!(matches!(
        read_frame(&mut Cursor::new(&buf)),
        Err(ProtocolError::BadVersion { .. })
    ));
}

#[test]
fn oversized_payload_is_rejected() {
    // forge a header claiming a payload beyond the cap
    let mut buf = Vec::new();
    buf.extend_from_slice(&FRAME_MAGIC.to_le_bytes());
    buf.extend_from_slice(&(MAX_PAYLOAD_SIZE + 1).to_le_bytes());
    buf.push(MsgType::HealthRequest as u8);
    buf.push(MSG_VERSION);
    buf.extend_from_slice(&[0, 0]);
    assert!(matches!(
        read_frame(&mut Cursor::new(&buf)),
        Err(ProtocolError::PayloadTooLarge { .. })
    ));
}

fn sample_request() -> SearchRequest {
    SearchRequest {
        k: 9,
        min_score: 5,
        max_gap: 100,
        max_freq: 50_000,
        min_diag_hits: 2,
        stage1_topn: 500,
        min_stage1_score: 3,
        num_results: 25,
        seqidlist_mode: SeqidlistMode::Include,
        mode: 2,
        stage1_score_type: 1,
        sort_score: 2,
        db_name: "nt".to_string(),
        seqids: vec!["ACC_1.1".to_string(), "ACC_2.1".to_string()],
        queries: vec![
            QueryEntry { query_id: "q1".to_string(), sequence: "ACGTACGTACGT".to_string() },
            QueryEntry { query_id: "q2".to_string(), sequence: "TTTTACGT".to_string() },
        ],
        min_stage1_score_frac_x10000: 5000,
    }
}

#[test]
fn search_request_round_trip() {
    let req = sample_request();
    let bytes = serialize_search_request(&req);
    let got = deserialize_search_request(&bytes).unwrap();
    assert_eq!(got, req);
}

#[test]
fn search_request_tolerates_trailing_bytes() {
    let req = sample_request();
    let mut bytes = serialize_search_request(&req);
    bytes.extend_from_slice(&[0xAB; 16]); // a future extension field
    let got = deserialize_search_request(&bytes).unwrap();
    assert_eq!(got, req);
}

#[test]
fn truncated_search_request_fails_cleanly() {
    let bytes = serialize_search_request(&sample_request());
    for cut in [0usize, 1, 5, 16, bytes.len() - 20] {
        assert!(
            deserialize_search_request(&bytes[..cut]).is_err(),
            "cut at {} should fail",
            cut
        );
    }
}

fn sample_response() -> SearchResponse {
    SearchResponse {
        status: 0,
        k: 9,
        mode: 2,
        stage1_score_type: 1,
        results: vec![
            QueryResult {
                query_id: "q1".to_string(),
                hits: vec![ResponseHit {
                    accession: "ACC_1.1".to_string(),
                    strand: 1,
                    q_start: 0,
                    q_end: 32,
                    s_start: 100,
                    s_end: 132,
                    score: 26,
                    stage1_score: 26,
                    volume: 3,
                }],
            },
            QueryResult { query_id: "q2".to_string(), hits: vec![] },
        ],
        rejected_query_ids: vec!["q9".to_string()],
    }
}

#[test]
fn search_response_round_trip() {
    let resp = sample_response();
    let bytes = serialize_search_response(&resp);
    assert_eq!(deserialize_search_response(&bytes).unwrap(), resp);
}

#[test]
fn search_response_rejected_list_is_optional_on_read() {
    let resp = sample_response();
    let bytes = serialize_search_response(&resp);
    // an older peer would stop before the rejected-queries trailer
    let trailer_len = 2 + 2 + "q9".len();
    let old = &bytes[..bytes.len() - trailer_len];
    let got = deserialize_search_response(old).unwrap();
    assert_eq!(got.results, resp.results);
    assert!(got.rejected_query_ids.is_empty());
}

#[test]
fn error_and_health_round_trips() {
    let err = ErrorResponse { error_code: 42, message: "no such database".to_string() };
    assert_eq!(
        deserialize_error_response(&serialize_error_response(&err)).unwrap(),
        err
    );

    let health = HealthResponse { status: 0 };
    assert_eq!(
        deserialize_health_response(&serialize_health_response(&health)).unwrap(),
        health
    );
}

#[test]
fn info_response_round_trip() {
    let info = InfoResponse {
        status: 0,
        default_k: 11,
        groups: vec![KmerGroupInfo {
            k: 11,
            kmer_type: 1,
            volumes: vec![
                VolumeInfo {
                    volume_index: 0,
                    num_sequences: 1000,
                    total_postings: 5_000_000,
                    db_name: "nt".to_string(),
                },
                VolumeInfo {
                    volume_index: 1,
                    num_sequences: 900,
                    total_postings: 4_400_000,
                    db_name: "nt".to_string(),
                },
            ],
        }],
    };
    let bytes = serialize_info_response(&info);
    assert_eq!(deserialize_info_response(&bytes).unwrap(), info);
}

#[test]
fn multiple_frames_stream_sequentially() {
    let mut buf = Vec::new();
    write_frame(&mut buf, MsgType::SearchRequest, &serialize_search_request(&sample_request()))
        .unwrap();
    write_frame(&mut buf, MsgType::HealthRequest, &[]).unwrap();

    let mut cursor = Cursor::new(&buf);
    let (h1, p1) = read_frame(&mut cursor).unwrap();
    assert_eq!(h1.msg_type, MsgType::SearchRequest);
    assert_eq!(deserialize_search_request(&p1).unwrap(), sample_request());
    let (h2, _) = read_frame(&mut cursor).unwrap();
    assert_eq!(h2.msg_type, MsgType::HealthRequest);
}
