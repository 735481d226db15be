//! Compaction planning
//!
//! Pure functions from the current manifest state to "what should merge
//! next". Three pluggable strategies; all feed the same k-way merge
//! executor in the scheduler.
//!
//! The manifest lists segments in read order (recency order). Every plan
//! picks inputs whose list positions can be collapsed to the position of
//! the first input without reordering any key's visible version: either a
//! contiguous run, or a run plus deeper-level segments that are
//! key-disjoint from everything skipped over.

use std::time::Duration;

use crate::config::CompactionStrategy;
use crate::store::SegmentMeta;

/// A planned merge: which segments go in, where the output lands
#[derive(Debug, Clone)]
pub struct CompactionJob {
    /// Manifest ids of the input segments, in read order
    pub input_ids: Vec<u64>,

    /// Level/tier assigned to the merge output
    pub target_level: u32,
}

/// Decide the next merge, if any
pub fn plan(strategy: &CompactionStrategy, segments: &[SegmentMeta]) -> Option<CompactionJob> {
    match strategy {
        CompactionStrategy::SizeTiered {
            min_merge_width,
            size_ratio,
        } => plan_size_tiered(segments, *min_merge_width, *size_ratio),
        CompactionStrategy::Leveled {
            level_base_bytes,
            level_fanout,
            level0_trigger,
        } => plan_leveled(segments, *level_base_bytes, *level_fanout, *level0_trigger),
        CompactionStrategy::TimeWindow { window } => plan_time_window(segments, *window),
    }
}

/// Size-tiered: merge the first run of >= `min_merge_width` adjacent
/// segments whose sizes are within `size_ratio` of each other. Output is
/// one segment of roughly their combined size, tiered one level deeper so
/// it doesn't immediately re-qualify.
fn plan_size_tiered(
    segments: &[SegmentMeta],
    min_merge_width: usize,
    size_ratio: f64,
) -> Option<CompactionJob> {
    let min_merge_width = min_merge_width.max(2);
    if segments.len() < min_merge_width {
        return None;
    }

    for start in 0..=(segments.len() - min_merge_width) {
        let window = &segments[start..];
        let mut min_size = u64::MAX;
        let mut max_size = 0u64;
        let mut width = 0;

        for meta in window {
            let lo = min_size.min(meta.file_size);
            let hi = max_size.max(meta.file_size);
            if hi as f64 > lo as f64 * size_ratio {
                break;
            }
            min_size = lo;
            max_size = hi;
            width += 1;
        }

        if width >= min_merge_width {
            let inputs = &window[..width];
            return Some(CompactionJob {
                input_ids: inputs.iter().map(|m| m.id).collect(),
                target_level: inputs.iter().map(|m| m.level).max().unwrap_or(0) + 1,
            });
        }
    }

    None
}

/// Leveled: level-0 count trigger merges all of L0 with the overlapping
/// part of L1; a level over its byte capacity pushes one segment (plus its
/// key-overlapping successors) one level down. Capacity of level L is
/// `level_base_bytes * level_fanout^(L-1)`.
fn plan_leveled(
    segments: &[SegmentMeta],
    level_base_bytes: u64,
    level_fanout: u64,
    level0_trigger: usize,
) -> Option<CompactionJob> {
    let level0: Vec<&SegmentMeta> = segments.iter().filter(|m| m.level == 0).collect();

    if level0.len() >= level0_trigger.max(1) {
        let min_key = level0.iter().map(|m| m.min_key.as_slice()).min()?;
        let max_key = level0.iter().map(|m| m.max_key.as_slice()).max()?;

        let mut input_ids: Vec<u64> = Vec::new();
        for meta in segments {
            if meta.level == 0 || (meta.level == 1 && meta.overlaps(min_key, max_key)) {
                input_ids.push(meta.id);
            }
        }
        return Some(CompactionJob {
            input_ids,
            target_level: 1,
        });
    }

    let max_level = segments.iter().map(|m| m.level).max()?;
    for level in 1..=max_level {
        let level_size: u64 = segments
            .iter()
            .filter(|m| m.level == level)
            .map(|m| m.file_size)
            .sum();
        let capacity = level_base_bytes.saturating_mul(level_fanout.saturating_pow(level - 1));
        if level_size <= capacity {
            continue;
        }

        // Push the oldest segment of the overflowing level down one
        let victim = segments.iter().rev().find(|m| m.level == level)?;
        let mut input_ids = vec![victim.id];
        for meta in segments {
            if meta.level == level + 1 && meta.overlaps(&victim.min_key, &victim.max_key) {
                input_ids.push(meta.id);
            }
        }
        // Keep read order: victim first, then the deeper overlaps
        input_ids.sort_by_key(|id| segments.iter().position(|m| m.id == *id));

        return Some(CompactionJob {
            input_ids,
            target_level: level + 1,
        });
    }

    None
}

/// Time-window: bucket segments by creation time; merge any closed bucket
/// that still holds more than one segment. Keys rarely updated after
/// their window closes make these merges near-final.
fn plan_time_window(segments: &[SegmentMeta], window: Duration) -> Option<CompactionJob> {
    let window_ms = window.as_millis().max(1) as u64;
    let current_bucket = crate::entry::now_millis() / window_ms;

    // Only adjacent runs are mergeable (read-order safety); segments are
    // created in time order, so a bucket's members are adjacent in
    // practice
    let mut start = 0;
    while start < segments.len() {
        let bucket = segments[start].created_at_ms / window_ms;
        let mut end = start + 1;
        while end < segments.len() && segments[end].created_at_ms / window_ms == bucket {
            end += 1;
        }

        if bucket < current_bucket && end - start > 1 {
            let members = &segments[start..end];
            return Some(CompactionJob {
                input_ids: members.iter().map(|m| m.id).collect(),
                target_level: members.iter().map(|m| m.level).max().unwrap_or(0) + 1,
            });
        }
        start = end;
    }

    None
}
