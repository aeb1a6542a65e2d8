//! Little-endian payload serializers.
//!
//! Strings are u16-length-prefixed. Every deserializer reads its known fields
//! and leaves whatever follows untouched, so newer peers can append extension
//! fields at the end of a payload without breaking older readers.

use crate::errors::ProtocolError;
use crate::messages::{
    ErrorResponse, HealthResponse, InfoResponse, KmerGroupInfo, QueryEntry, QueryResult,
    ResponseHit, SearchRequest, SearchResponse, SeqidlistMode, VolumeInfo,
};

fn put_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_str16(buf: &mut Vec<u8>, s: &str) {
    put_u16(buf, s.len() as u16);
    buf.extend_from_slice(s.as_bytes());
}

/// Cursor over a payload with bounds-checked little-endian reads.
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Reader<'a> {
        Reader { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::TruncatedPayload);
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn get_u8(&mut self) -> Result<u8, ProtocolError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16, ProtocolError> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn get_u32(&mut self) -> Result<u32, ProtocolError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn get_u64(&mut self) -> Result<u64, ProtocolError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn get_str16(&mut self) -> Result<String, ProtocolError> {
        let len = self.get_u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::TruncatedPayload)
    }

    pub fn get_bytes32(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let len = self.get_u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}

// ---------- SearchRequest

pub fn serialize_search_request(req: &SearchRequest) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);
    put_u8(&mut buf, req.k);
    put_u16(&mut buf, req.min_score);
    put_u16(&mut buf, req.max_gap);
    put_u32(&mut buf, req.max_freq);
    put_u8(&mut buf, req.min_diag_hits);
    put_u16(&mut buf, req.stage1_topn);
    put_u16(&mut buf, req.min_stage1_score);
    put_u16(&mut buf, req.num_results);
    put_u8(&mut buf, req.seqidlist_mode as u8);
    put_u8(&mut buf, req.mode);
    put_u8(&mut buf, (req.stage1_score_type & 0x0F) | (req.sort_score << 4));
    put_str16(&mut buf, &req.db_name);

    put_u32(&mut buf, req.seqids.len() as u32);
    for acc in &req.seqids {
        put_str16(&mut buf, acc);
    }

    put_u16(&mut buf, req.queries.len() as u16);
    for q in &req.queries {
        put_str16(&mut buf, &q.query_id);
        put_u32(&mut buf, q.sequence.len() as u32);
        buf.extend_from_slice(q.sequence.as_bytes());
    }

    // extension trailer: fractional stage-1 floor
    put_u16(&mut buf, req.min_stage1_score_frac_x10000);
    buf
}

pub fn deserialize_search_request(data: &[u8]) -> Result<SearchRequest, ProtocolError> {
    let mut r = Reader::new(data);
    let mut req = SearchRequest {
        k: r.get_u8()?,
        min_score: r.get_u16()?,
        max_gap: r.get_u16()?,
        max_freq: r.get_u32()?,
        min_diag_hits: r.get_u8()?,
        stage1_topn: r.get_u16()?,
        min_stage1_score: r.get_u16()?,
        num_results: r.get_u16()?,
        ..Default::default()
    };
    req.seqidlist_mode = SeqidlistMode::from_u8(r.get_u8()?)
        .ok_or(ProtocolError::TruncatedPayload)?;
    req.mode = r.get_u8()?;
    let packed = r.get_u8()?;
    req.stage1_score_type = packed & 0x0F;
    req.sort_score = (packed >> 4) & 0x0F;
    req.db_name = r.get_str16()?;

    let num_seqids = r.get_u32()?;
    req.seqids.reserve(num_seqids as usize);
    for _ in 0..num_seqids {
        req.seqids.push(r.get_str16()?);
    }

    let num_queries = r.get_u16()?;
    req.queries.reserve(num_queries as usize);
    for _ in 0..num_queries {
        let query_id = r.get_str16()?;
        let sequence = String::from_utf8(r.get_bytes32()?)
            .map_err(|_| ProtocolError::TruncatedPayload)?;
        req.queries.push(QueryEntry { query_id, sequence });
    }

    if r.remaining() >= 2 {
        req.min_stage1_score_frac_x10000 = r.get_u16()?;
    }
    Ok(req)
}

// ---------- SearchResponse

pub fn serialize_search_response(resp: &SearchResponse) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1024);
    put_u8(&mut buf, resp.status);
    put_u8(&mut buf, resp.k);
    put_u8(&mut buf, resp.mode);
    put_u8(&mut buf, resp.stage1_score_type);
    put_u16(&mut buf, resp.results.len() as u16);

    for qr in &resp.results {
        put_str16(&mut buf, &qr.query_id);
        put_u16(&mut buf, qr.hits.len() as u16);
        for hit in &qr.hits {
            put_str16(&mut buf, &hit.accession);
            put_u8(&mut buf, hit.strand);
            put_u32(&mut buf, hit.q_start);
            put_u32(&mut buf, hit.q_end);
            put_u32(&mut buf, hit.s_start);
            put_u32(&mut buf, hit.s_end);
            put_u16(&mut buf, hit.score);
            put_u16(&mut buf, hit.stage1_score);
            put_u16(&mut buf, hit.volume);
        }
    }

    // extension trailer: queries bounced by admission control
    put_u16(&mut buf, resp.rejected_query_ids.len() as u16);
    for id in &resp.rejected_query_ids {
        put_str16(&mut buf, id);
    }
    buf
}

pub fn deserialize_search_response(data: &[u8]) -> Result<SearchResponse, ProtocolError> {
    let mut r = Reader::new(data);
    let mut resp = SearchResponse {
        status: r.get_u8()?,
        k: r.get_u8()?,
        mode: r.get_u8()?,
        stage1_score_type: r.get_u8()?,
        ..Default::default()
    };

    let num_queries = r.get_u16()?;
    resp.results.reserve(num_queries as usize);
    for _ in 0..num_queries {
        let mut qr = QueryResult { query_id: r.get_str16()?, ..Default::default() };
        let num_hits = r.get_u16()?;
        qr.hits.reserve(num_hits as usize);
        for _ in 0..num_hits {
            qr.hits.push(ResponseHit {
                accession: r.get_str16()?,
                strand: r.get_u8()?,
                q_start: r.get_u32()?,
                q_end: r.get_u32()?,
                s_start: r.get_u32()?,
                s_end: r.get_u32()?,
                score: r.get_u16()?,
                stage1_score: r.get_u16()?,
                volume: r.get_u16()?,
            });
        }
        resp.results.push(qr);
    }

    // older peers stop here; the rejected list is an extension trailer
    if r.remaining() >= 2 {
        let num_rejected = r.get_u16()?;
        for _ in 0..num_rejected {
            resp.rejected_query_ids.push(r.get_str16()?);
        }
    }
    Ok(resp)
}

// ---------- ErrorResponse

pub fn serialize_error_response(err: &ErrorResponse) -> Vec<u8> {
    let mut buf = Vec::new();
    put_u32(&mut buf, err.error_code);
    put_str16(&mut buf, &err.message);
    buf
}

pub fn deserialize_error_response(data: &[u8]) -> Result<ErrorResponse, ProtocolError> {
    let mut r = Reader::new(data);
    Ok(ErrorResponse { error_code: r.get_u32()?, message: r.get_str16()? })
}

// ---------- HealthResponse

pub fn serialize_health_response(resp: &HealthResponse) -> Vec<u8> {
    vec![resp.status]
}

pub fn deserialize_health_response(data: &[u8]) -> Result<HealthResponse, ProtocolError> {
    let mut r = Reader::new(data);
    Ok(HealthResponse { status: r.get_u8()? })
}

// ---------- InfoResponse

pub fn serialize_info_response(resp: &InfoResponse) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);
    put_u8(&mut buf, resp.status);
    put_u8(&mut buf, resp.default_k);
    put_u16(&mut buf, resp.groups.len() as u16);
    for g in &resp.groups {
        put_u8(&mut buf, g.k);
        put_u8(&mut buf, g.kmer_type);
        put_u16(&mut buf, g.volumes.len() as u16);
        for v in &g.volumes {
            put_u16(&mut buf, v.volume_index);
            put_u32(&mut buf, v.num_sequences);
            put_u64(&mut buf, v.total_postings);
            put_str16(&mut buf, &v.db_name);
        }
    }
    buf
}

pub fn deserialize_info_response(data: &[u8]) -> Result<InfoResponse, ProtocolError> {
    let mut r = Reader::new(data);
    let mut resp = InfoResponse {
        status: r.get_u8()?,
        default_k: r.get_u8()?,
        ..Default::default()
    };
    let num_groups = r.get_u16()?;
    for _ in 0..num_groups {
        let mut group = KmerGroupInfo {
            k: r.get_u8()?,
            kmer_type: r.get_u8()?,
            ..Default::default()
        };
        let num_volumes = r.get_u16()?;
        for _ in 0..num_volumes {
            group.volumes.push(VolumeInfo {
                volume_index: r.get_u16()?,
                num_sequences: r.get_u32()?,
                total_postings: r.get_u64()?,
                db_name: r.get_str16()?,
            });
        }
        resp.groups.push(group);
    }
    Ok(resp)
}
