//! Fixed-layout bookkeeping buffer of one replica.
//!
//! Layout, all little-endian:
//!   observables (f64 × 12) | averaged node stats (f64 × 7)
//!   | histogram counts (i32 × bins, if enabled)
//!   | sorbate records (f64 × 4 each, only with more than one sorbate)

use crate::error::{PimcError, PimcResult};
use crate::replica::{AvgNodeStats, Observables, Replica, SorbateInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MessageLayout {
    /// Total number of histogram cells, 0 when disabled
    pub histogram_bins: usize,
    pub sorbate_count: usize,
}

impl MessageLayout {
    pub fn new(histogram_bins: usize, sorbate_count: usize) -> Self {
        Self {
            histogram_bins,
            sorbate_count,
        }
    }

    pub fn sorbate_records(&self) -> usize {
        if self.sorbate_count > 1 {
            self.sorbate_count
        } else {
            0
        }
    }

    pub fn byte_len(&self) -> usize {
        (Observables::FIELDS + AvgNodeStats::FIELDS) * 8
            + self.histogram_bins * 4
            + self.sorbate_records() * SorbateInfo::FIELDS * 8
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReplicaMessage {
    pub observables: Observables,
    pub avg_node_stats: AvgNodeStats,
    pub histogram: Vec<i32>,
    pub sorbates: Vec<SorbateInfo>,
}

impl ReplicaMessage {
    pub fn from_replica(replica: &Replica, layout: &MessageLayout) -> Self {
        let histogram = match (&replica.histogram, layout.histogram_bins) {
            (_, 0) => Vec::new(),
            (Some(h), _) => h.counts.clone(),
            (None, n) => vec![0; n],
        };
        let mut sorbates = replica.sorbate_info.clone();
        sorbates.resize(layout.sorbate_records(), SorbateInfo::default());
        Self {
            observables: replica.observables,
            avg_node_stats: replica.avg_node_stats,
            histogram,
            sorbates,
        }
    }

    pub fn pack(&self, layout: &MessageLayout) -> PimcResult<Vec<u8>> {
        if self.histogram.len() != layout.histogram_bins || self.sorbates.len() != layout.sorbate_records() {
            return Err(PimcError::Internal(format!(
                "message does not match layout: {} histogram cells for {}, {} sorbate records for {}",
                self.histogram.len(),
                layout.histogram_bins,
                self.sorbates.len(),
                layout.sorbate_records()
            )));
        }
        let mut buf = Vec::with_capacity(layout.byte_len());
        let floats = self
            .observables
            .to_array()
            .into_iter()
            .chain(self.avg_node_stats.to_array());
        for x in floats {
            buf.extend_from_slice(&x.to_le_bytes());
        }
        for c in &self.histogram {
            buf.extend_from_slice(&c.to_le_bytes());
        }
        for s in &self.sorbates {
            for x in s.to_array() {
                buf.extend_from_slice(&x.to_le_bytes());
            }
        }
        Ok(buf)
    }

    pub fn unpack(bytes: &[u8], layout: &MessageLayout) -> PimcResult<Self> {
        if bytes.len() != layout.byte_len() {
            return Err(PimcError::Internal(format!(
                "bookkeeping buffer has {} bytes, layout expects {}",
                bytes.len(),
                layout.byte_len()
            )));
        }
        let mut reader = Reader { bytes, pos: 0 };
        let observables = Observables::from_array(&reader.f64s());
        let avg_node_stats = AvgNodeStats::from_array(&reader.f64s());
        let histogram = (0..layout.histogram_bins).map(|_| reader.i32()).collect();
        let sorbates = (0..layout.sorbate_records())
            .map(|_| SorbateInfo::from_array(&reader.f64s()))
            .collect();
        Ok(Self {
            observables,
            avg_node_stats,
            histogram,
            sorbates,
        })
    }
}

/// Cursor over a buffer whose length was already checked.
struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.pos..self.pos + N]);
        self.pos += N;
        out
    }

    fn f64s<const N: usize>(&mut self) -> [f64; N] {
        std::array::from_fn(|_| f64::from_le_bytes(self.take()))
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take())
    }
}
