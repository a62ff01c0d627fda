//! Raw CSV log blocks to typed records.
//!
//! A block is one header line followed by data rows. The header picks the
//! record kind by exact match. Rows with the wrong number of fields are
//! dropped one by one; only a bundle with the wrong number of blocks fails.

use crate::campaign::Campaign;
use crate::error::CoreError;
use crate::record::{ClickRecord, ImpressionRecord, ServerVisitRecord};

pub const IMPRESSION_HEADER: &str = "Date,ID,Gender,Age,Income,Context,Impression Cost";
pub const CLICK_HEADER: &str = "Date,ID,Click Cost";
pub const VISIT_HEADER: &str = "Entry Date,ID,Exit Date,Pages Viewed,Conversion";

/// Number of blocks in a campaign bundle: impressions, clicks, visits.
pub const BUNDLE_ENTRIES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Impressions,
    Clicks,
    Visits,
}

impl LogKind {
    pub fn from_header(header: &str) -> Option<Self> {
        match header {
            IMPRESSION_HEADER => Some(Self::Impressions),
            CLICK_HEADER => Some(Self::Clicks),
            VISIT_HEADER => Some(Self::Visits),
            _ => None,
        }
    }

    pub fn header(&self) -> &'static str {
        match self {
            Self::Impressions => IMPRESSION_HEADER,
            Self::Clicks => CLICK_HEADER,
            Self::Visits => VISIT_HEADER,
        }
    }

    /// Fields per data row.
    pub fn arity(&self) -> usize {
        match self {
            Self::Impressions => 7,
            Self::Clicks => 3,
            Self::Visits => 5,
        }
    }
}

/// The records parsed out of one block. May be empty when no row survived.
#[derive(Debug, Clone, PartialEq)]
pub enum LogBlock {
    Impressions(Vec<ImpressionRecord>),
    Clicks(Vec<ClickRecord>),
    Visits(Vec<ServerVisitRecord>),
}

impl LogBlock {
    pub fn kind(&self) -> LogKind {
        match self {
            Self::Impressions(_) => LogKind::Impressions,
            Self::Clicks(_) => LogKind::Clicks,
            Self::Visits(_) => LogKind::Visits,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Impressions(rows) => rows.len(),
            Self::Clicks(rows) => rows.len(),
            Self::Visits(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parse one block.
///
/// Returns `None` when the block has no recognizable header (it is skipped,
/// not an error) and `Some` with a possibly empty record list otherwise.
pub fn parse_block(text: &str) -> Option<LogBlock> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let (header, body) = text.split_once('\n').unwrap_or((text, ""));
    let header = header.trim_end_matches('\r');

    let Some(kind) = LogKind::from_header(header) else {
        tracing::warn!(header, "skipping log block with unrecognized header");
        return None;
    };

    // Log fields are never quoted; a stray quote must not swallow later rows.
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(body.as_bytes());

    let mut dropped = 0usize;
    let mut rows: Vec<csv::StringRecord> = Vec::new();
    for (line, result) in reader.records().enumerate() {
        match result {
            Ok(row) if row.len() == kind.arity() => rows.push(row),
            Ok(row) => {
                dropped += 1;
                tracing::debug!(
                    line = line + 2,
                    fields = row.len(),
                    expected = kind.arity(),
                    "dropping row with wrong field count"
                );
            }
            Err(e) => {
                dropped += 1;
                tracing::debug!(line = line + 2, error = %e, "dropping unreadable row");
            }
        }
    }

    let block = match kind {
        LogKind::Impressions => LogBlock::Impressions(
            rows.iter()
                .map(|r| {
                    ImpressionRecord::from_fields(&r[0], &r[1], &r[2], &r[3], &r[4], &r[5], &r[6])
                })
                .collect(),
        ),
        LogKind::Clicks => LogBlock::Clicks(
            rows.iter()
                .map(|r| ClickRecord::from_fields(&r[0], &r[1], &r[2]))
                .collect(),
        ),
        LogKind::Visits => LogBlock::Visits(
            rows.iter()
                .map(|r| ServerVisitRecord::from_fields(&r[0], &r[1], &r[2], &r[3], &r[4]))
                .collect(),
        ),
    };

    tracing::debug!(kind = ?kind, rows = block.len(), dropped, "parsed log block");
    Some(block)
}

/// Ingest a bundle of exactly three blocks into a [`Campaign`].
///
/// Blocks are matched to record kinds by header, in any order. A block with
/// an unknown header, or a second block of a kind already seen, is skipped. A kind
/// with no block stays empty.
pub fn ingest_bundle<S: AsRef<str>>(blocks: &[S]) -> Result<Campaign, CoreError> {
    if blocks.len() != BUNDLE_ENTRIES {
        tracing::warn!(found = blocks.len(), "rejecting malformed bundle");
        return Err(CoreError::MalformedBundle {
            found: blocks.len(),
        });
    }

    let mut impressions = None;
    let mut clicks = None;
    let mut visits = None;

    for block in blocks.iter().filter_map(|b| parse_block(b.as_ref())) {
        let kind = block.kind();
        let duplicate = match block {
            LogBlock::Impressions(rows) => fill_once(&mut impressions, rows),
            LogBlock::Clicks(rows) => fill_once(&mut clicks, rows),
            LogBlock::Visits(rows) => fill_once(&mut visits, rows),
        };
        if duplicate {
            tracing::warn!(kind = ?kind, "bundle repeats a log kind; keeping the first block");
        }
    }

    let campaign = Campaign::new(impressions, clicks, visits);
    tracing::info!(
        impressions = campaign.impressions().len(),
        clicks = campaign.clicks().len(),
        visits = campaign.visits().len(),
        "bundle ingested"
    );
    Ok(campaign)
}

/// Store `value` unless the slot is taken. Returns true when it was taken.
fn fill_once<T>(slot: &mut Option<T>, value: T) -> bool {
    if slot.is_some() {
        return true;
    }
    *slot = Some(value);
    false
}
