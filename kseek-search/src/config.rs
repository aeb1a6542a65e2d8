//! Search configuration.

use kseek_core::types::{MAX_K, MIN_K};

use crate::errors::SearchError;

/// How deep the pipeline runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchMode {
    /// Candidate filtering only; hits carry stage-1 scores and no coordinates.
    Stage1Only,
    /// Filtering plus chaining (the default).
    Chain,
    /// Filtering, chaining and semi-global alignment.
    Align,
}

impl SearchMode {
    pub fn from_u8(v: u8) -> Option<SearchMode> {
        match v {
            1 => Some(SearchMode::Stage1Only),
            2 => Some(SearchMode::Chain),
            3 => Some(SearchMode::Align),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            SearchMode::Stage1Only => 1,
            SearchMode::Chain => 2,
            SearchMode::Align => 3,
        }
    }
}

/// Stage-1 scoring flavour.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage1ScoreType {
    /// Distinct query positions hitting an oid; each position counts once.
    Coverscore,
    /// Every shared posting counts.
    Matchscore,
}

impl Stage1ScoreType {
    pub fn from_u8(v: u8) -> Option<Stage1ScoreType> {
        match v {
            1 => Some(Stage1ScoreType::Coverscore),
            2 => Some(Stage1ScoreType::Matchscore),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Stage1ScoreType::Coverscore => 1,
            Stage1ScoreType::Matchscore => 2,
        }
    }
}

/// Which strands to search.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrandChoice {
    Plus,
    Minus,
    Both,
}

impl StrandChoice {
    pub fn from_i8(v: i8) -> Option<StrandChoice> {
        match v {
            1 => Some(StrandChoice::Plus),
            -1 => Some(StrandChoice::Minus),
            2 => Some(StrandChoice::Both),
            _ => None,
        }
    }

    pub fn searches_plus(self) -> bool {
        matches!(self, StrandChoice::Plus | StrandChoice::Both)
    }

    pub fn searches_minus(self) -> bool {
        matches!(self, StrandChoice::Minus | StrandChoice::Both)
    }
}

/// Field the final per-query ordering uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortScore {
    Stage1,
    Chain,
    Alignment,
}

impl SortScore {
    /// The natural sort field for a mode: the deepest score it produces.
    pub fn for_mode(mode: SearchMode) -> SortScore {
        match mode {
            SearchMode::Stage1Only => SortScore::Stage1,
            SearchMode::Chain => SortScore::Chain,
            SearchMode::Align => SortScore::Alignment,
        }
    }

    pub fn from_u8(v: u8) -> Option<SortScore> {
        match v {
            1 => Some(SortScore::Stage1),
            2 => Some(SortScore::Chain),
            3 => Some(SortScore::Alignment),
            _ => None,
        }
    }
}

/// Stage-1 options.
#[derive(Clone, Debug)]
pub struct Stage1Config {
    pub score_type: Stage1ScoreType,
    /// Per-volume candidate cap; 0 keeps everything.
    pub topn: u32,
    /// Absolute stage-1 floor; with `min_score_frac == 0`, 0 disables the floor.
    pub min_score: u32,
    /// Fraction in `(0, 1)` enabling per-query adaptive thresholds.
    pub min_score_frac: f64,
    /// Absolute high-frequency cutoff; 0 auto-computes from index statistics.
    pub max_freq: u32,
    /// Fraction in `(0, 1)` resolved over the live total sequence count.
    pub max_freq_frac: f64,
}

impl Default for Stage1Config {
    fn default() -> Stage1Config {
        Stage1Config {
            score_type: Stage1ScoreType::Coverscore,
            topn: 0,
            min_score: 0,
            min_score_frac: 0.5,
            max_freq: 0,
            max_freq_frac: 0.5,
        }
    }
}

/// Stage-2 options.
#[derive(Clone, Debug)]
pub struct Stage2Config {
    /// Chain-score floor; 0 adapts to the resolved stage-1 threshold.
    pub min_score: u32,
    /// Largest diagonal deviation between consecutive chain links.
    pub max_gap: u32,
    /// DP lookback bound; 0 means unlimited.
    pub max_lookback: u32,
    /// Diagonal-filter threshold.
    pub min_diag_hits: u32,
}

impl Default for Stage2Config {
    fn default() -> Stage2Config {
        Stage2Config { min_score: 0, max_gap: 100, max_lookback: 64, min_diag_hits: 1 }
    }
}

/// Stage-3 context extension: absolute bases or a fraction of query length.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ContextParam {
    Absolute(u32),
    Ratio(f64),
}

impl Default for ContextParam {
    fn default() -> ContextParam {
        ContextParam::Absolute(0)
    }
}

impl ContextParam {
    /// Parses the `-context` value: an integer is absolute bases, a decimal
    /// is a query-length multiplier.
    pub fn parse(text: &str) -> Result<ContextParam, SearchError> {
        if text.contains('.') {
            let ratio: f64 = text.parse().map_err(|_| SearchError::InvalidConfig {
                reason: format!("context '{}' is not a number", text),
            })?;
            if ratio < 0.0 {
                return Err(SearchError::InvalidConfig {
                    reason: "context must not be negative".to_string(),
                });
            }
            Ok(ContextParam::Ratio(ratio))
        } else {
            let abs: u32 = text.parse().map_err(|_| SearchError::InvalidConfig {
                reason: format!("context '{}' is not a number", text),
            })?;
            Ok(ContextParam::Absolute(abs))
        }
    }

    pub fn resolve(&self, query_len: u32) -> u32 {
        match *self {
            ContextParam::Absolute(a) => a,
            ContextParam::Ratio(r) => (query_len as f64 * r) as u32,
        }
    }
}

/// Stage-3 options.
#[derive(Clone, Debug)]
pub struct Stage3Config {
    pub gap_open: i32,
    pub gap_ext: i32,
    pub traceback: bool,
    pub min_pident: f64,
    pub min_nident: u32,
    pub context: ContextParam,
}

impl Default for Stage3Config {
    fn default() -> Stage3Config {
        Stage3Config {
            gap_open: 10,
            gap_ext: 1,
            traceback: false,
            min_pident: 0.0,
            min_nident: 0,
            context: ContextParam::default(),
        }
    }
}

/// The full option set of a search run.
#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub mode: SearchMode,
    pub strand: StrandChoice,
    pub stage1: Stage1Config,
    pub stage2: Stage2Config,
    pub stage3: Stage3Config,
    /// Per-query output cap; 0 is unlimited.
    pub num_results: u32,
    pub sort_score: SortScore,
    /// Accept queries containing IUPAC ambiguity codes.
    pub accept_qdegen: bool,
}

impl Default for SearchConfig {
    fn default() -> SearchConfig {
        SearchConfig {
            mode: SearchMode::Chain,
            strand: StrandChoice::Both,
            stage1: Stage1Config::default(),
            stage2: Stage2Config::default(),
            stage3: Stage3Config::default(),
            num_results: 0,
            sort_score: SortScore::Chain,
            accept_qdegen: true,
        }
    }
}

impl SearchConfig {
    /// Boundary validation; everything here is rejected before any index work.
    pub fn validate(&self, k: usize) -> Result<(), SearchError> {
        if !(MIN_K..=MAX_K).contains(&k) {
            return Err(SearchError::InvalidConfig {
                reason: format!("k={} is outside [{}, {}]", k, MIN_K, MAX_K),
            });
        }
        let frac = self.stage1.min_score_frac;
        if frac != 0.0 && !(0.0..1.0).contains(&frac) {
            return Err(SearchError::InvalidConfig {
                reason: format!("min_stage1_score_frac={} is outside (0, 1)", frac),
            });
        }
        let mf = self.stage1.max_freq_frac;
        if mf != 0.0 && !(0.0..1.0).contains(&mf) {
            return Err(SearchError::InvalidConfig {
                reason: format!("max_freq_frac={} is outside (0, 1)", mf),
            });
        }
        if frac > 0.0 && self.stage1.min_score > 0 {
            return Err(SearchError::InvalidConfig {
                reason: "fractional and absolute stage-1 floors are mutually exclusive"
                    .to_string(),
            });
        }
        Ok(())
    }

    /// Resolves a fractional high-frequency cutoff against the live total
    /// sequence count, once per process before any query runs.
    pub fn resolve_max_freq(&mut self, total_nseq: u64) {
        let frac = self.stage1.max_freq_frac;
        if self.stage1.max_freq == 0 && frac > 0.0 && frac < 1.0 {
            self.stage1.max_freq = ((frac * total_nseq as f64).ceil() as u32).max(1);
        }
    }
}
