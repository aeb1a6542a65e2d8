//! Message bodies exchanged over the frame envelope.

/// Accession-filter polarity carried in a search request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum SeqidlistMode {
    #[default]
    None = 0,
    Include = 1,
    Exclude = 2,
}

impl SeqidlistMode {
    pub fn from_u8(v: u8) -> Option<SeqidlistMode> {
        match v {
            0 => Some(SeqidlistMode::None),
            1 => Some(SeqidlistMode::Include),
            2 => Some(SeqidlistMode::Exclude),
            _ => None,
        }
    }
}

/// One query sequence inside a search request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryEntry {
    pub query_id: String,
    pub sequence: String,
}

/// Client-to-server search request. Zero-valued fields mean "use the server
/// default".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchRequest {
    pub k: u8,
    pub min_score: u16,
    pub max_gap: u16,
    pub max_freq: u32,
    pub min_diag_hits: u8,
    pub stage1_topn: u16,
    pub min_stage1_score: u16,
    pub num_results: u16,
    pub seqidlist_mode: SeqidlistMode,
    pub mode: u8,
    pub stage1_score_type: u8,
    pub sort_score: u8,
    /// Logical database to search on the server.
    pub db_name: String,
    pub seqids: Vec<String>,
    pub queries: Vec<QueryEntry>,
    /// Fractional stage-1 floor scaled by 10000; 0 defers to `min_stage1_score`.
    pub min_stage1_score_frac_x10000: u16,
}

/// One hit inside a search response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseHit {
    pub accession: String,
    /// 0 = plus, 1 = minus.
    pub strand: u8,
    pub q_start: u32,
    pub q_end: u32,
    pub s_start: u32,
    pub s_end: u32,
    pub score: u16,
    pub stage1_score: u16,
    pub volume: u16,
}

/// Per-query block of a search response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub query_id: String,
    pub hits: Vec<ResponseHit>,
}

/// Server-to-client search response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SearchResponse {
    /// 0 = success.
    pub status: u8,
    pub k: u8,
    pub mode: u8,
    pub stage1_score_type: u8,
    pub results: Vec<QueryResult>,
    /// Queries turned away by admission control; the client may retry them.
    pub rejected_query_ids: Vec<String>,
}

/// Server-to-client error.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error_code: u32,
    pub message: String,
}

/// Liveness probe; the request has an empty payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HealthResponse {
    /// 0 = OK.
    pub status: u8,
}

/// Per-volume block of an info response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VolumeInfo {
    pub volume_index: u16,
    pub num_sequences: u32,
    pub total_postings: u64,
    pub db_name: String,
}

/// Per-k block of an info response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KmerGroupInfo {
    pub k: u8,
    /// 0 = 16-bit k-mers, 1 = 32-bit.
    pub kmer_type: u8,
    pub volumes: Vec<VolumeInfo>,
}

/// Server-to-client index inventory.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InfoResponse {
    pub status: u8,
    pub default_k: u8,
    pub groups: Vec<KmerGroupInfo>,
}
