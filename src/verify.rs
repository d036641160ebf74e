//! Archive integrity verification.
//!
//! Walks a container archive entry by entry and reports a health verdict
//! for each.  The structural pass validates entry headers and chunk
//! sequencing without decoding payloads; the deep pass additionally runs
//! every chunk through the full decode pipeline (which requires the
//! archive to be unlocked when it is encrypted).
//!
//! The report serializes to JSON for external tooling.

use serde::Serialize;
use std::io::{Read, Seek, SeekFrom};

use crate::chunk::ChunkHeader;
use crate::error::Result;
use crate::reader::ApackReader;

/// Health verdict for one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EntryHealth {
    /// Header and every inspected chunk are consistent.
    Intact,
    /// The entry header failed validation; chunks were not inspected.
    HeaderCorrupt { detail: String },
    /// A chunk failed structural checks or (deep mode) payload decoding.
    ChunkCorrupt { chunk_index: u32, detail: String },
}

impl EntryHealth {
    pub fn is_intact(&self) -> bool {
        matches!(self, EntryHealth::Intact)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryReport {
    pub id:          u64,
    pub name:        String,
    pub chunk_count: u32,
    pub health:      EntryHealth,
}

/// Overall archive verdict, coarsest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArchiveQuality {
    /// Every entry intact.
    Intact,
    /// At least one entry damaged, at least one intact.
    Degraded,
    /// No entry survived verification.
    Unreadable,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub entry_count:    u64,
    pub intact_entries: u64,
    pub quality:        ArchiveQuality,
    pub entries:        Vec<EntryReport>,
}

impl VerifyReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Verify every entry of an opened archive.
///
/// With `deep == false` only headers and chunk framing are checked; with
/// `deep == true` every chunk payload is decoded and checksummed.  Damage
/// to one entry never stops the walk — other entries are still inspected.
pub fn verify_archive<R: Read + Seek>(
    reader: &mut ApackReader<R>,
    deep: bool,
) -> Result<VerifyReport> {
    let toc: Vec<_> = reader.toc().to_vec();
    let mut entries = Vec::with_capacity(toc.len());
    let mut intact = 0u64;

    for (index, rec) in toc.iter().enumerate() {
        let report = match verify_entry(reader, index, deep) {
            Ok(report) => report,
            Err(e) => EntryReportDraft {
                name:        format!("entry#{}", rec.id),
                chunk_count: 0,
                health:      EntryHealth::HeaderCorrupt {
                    detail: e.to_string(),
                },
            },
        };
        if report.health.is_intact() {
            intact += 1;
        }
        entries.push(EntryReport {
            id:          rec.id,
            name:        report.name,
            chunk_count: report.chunk_count,
            health:      report.health,
        });
    }

    let quality = if entries.is_empty() || intact == entries.len() as u64 {
        ArchiveQuality::Intact
    } else if intact == 0 {
        ArchiveQuality::Unreadable
    } else {
        ArchiveQuality::Degraded
    };

    Ok(VerifyReport {
        entry_count: entries.len() as u64,
        intact_entries: intact,
        quality,
        entries,
    })
}

struct EntryReportDraft {
    name:        String,
    chunk_count: u32,
    health:      EntryHealth,
}

fn verify_entry<R: Read + Seek>(
    reader: &mut ApackReader<R>,
    toc_index: usize,
    deep: bool,
) -> Result<EntryReportDraft> {
    let rec = reader.toc()[toc_index];

    // Header validation happens inside the entry load.
    let entry = match reader.get_by_id(rec.id)? {
        Some(e) => e,
        None => {
            return Ok(EntryReportDraft {
                name:        format!("entry#{}", rec.id),
                chunk_count: 0,
                health:      EntryHealth::HeaderCorrupt {
                    detail: "TOC record points at no readable entry".into(),
                },
            })
        }
    };

    let health = if deep {
        match deep_check(reader, &entry) {
            Ok(()) => EntryHealth::Intact,
            Err((chunk_index, detail)) => EntryHealth::ChunkCorrupt { chunk_index, detail },
        }
    } else {
        match structural_check(reader, &entry) {
            Ok(()) => EntryHealth::Intact,
            Err((chunk_index, detail)) => EntryHealth::ChunkCorrupt { chunk_index, detail },
        }
    };

    Ok(EntryReportDraft {
        name: entry.name.clone(),
        chunk_count: entry.chunk_count,
        health,
    })
}

/// Walk chunk headers without decoding payloads.
fn structural_check<R: Read + Seek>(
    reader: &mut ApackReader<R>,
    entry: &crate::entry::Entry,
) -> std::result::Result<(), (u32, String)> {
    let source = match reader_source(reader, entry.data_offset) {
        Ok(s) => s,
        Err(e) => return Err((0, e)),
    };
    let mut stored_total = 0u64;
    for i in 0..entry.chunk_count {
        let header = ChunkHeader::read_from(&mut *source).map_err(|e| (i, e.to_string()))?;
        if header.chunk_index != i {
            return Err((i, format!("chunk index {} out of order", header.chunk_index)));
        }
        let should_be_last = i + 1 == entry.chunk_count;
        if header.is_last() != should_be_last {
            return Err((i, "LAST flag does not match the chunk count".into()));
        }
        stored_total += u64::from(header.stored_size);
        source
            .seek(SeekFrom::Current(i64::from(header.stored_size)))
            .map_err(|e| (i, e.to_string()))?;
    }
    if stored_total != entry.stored_size {
        return Err((
            entry.chunk_count.saturating_sub(1),
            format!(
                "chunk payloads total {} bytes, entry header declares {}",
                stored_total, entry.stored_size
            ),
        ));
    }
    Ok(())
}

/// Decode every chunk through the full pipeline.
fn deep_check<R: Read + Seek>(
    reader: &mut ApackReader<R>,
    entry: &crate::entry::Entry,
) -> std::result::Result<(), (u32, String)> {
    let mut stream = match reader.open_entry(entry) {
        Ok(s) => s,
        Err(e) => return Err((0, e.to_string())),
    };
    let mut index = 0u32;
    loop {
        match stream.next_chunk() {
            Ok(Some(_)) => index += 1,
            Ok(None) => return Ok(()),
            Err(e) => return Err((index, e.to_string())),
        }
    }
}

fn reader_source<'a, R: Read + Seek>(
    reader: &'a mut ApackReader<R>,
    offset: u64,
) -> std::result::Result<&'a mut R, String> {
    let source = reader
        .source_mut()
        .ok_or_else(|| "archive is already closed".to_owned())?;
    source
        .seek(SeekFrom::Start(offset))
        .map_err(|e| e.to_string())?;
    Ok(source)
}
