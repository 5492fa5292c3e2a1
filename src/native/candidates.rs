//! Reusable candidate distribution slab.

use llama_cpp_sys_2 as sys;

/// Working array of `{token id, logit, probability}` entries, one per
/// vocabulary entry, plus a sorted flag. Reloaded from a logits row before
/// each sampler-chain run; samplers rewrite, reorder, and shrink it.
pub struct CandidateBuffer {
    data: Vec<sys::llama_token_data>,
    sorted: bool,
}

impl CandidateBuffer {
    pub fn new(n_vocab: usize) -> Self {
        Self { data: Vec::with_capacity(n_vocab), sorted: false }
    }

    /// Reload from a raw logits row. Probabilities reset to zero and the
    /// buffer is unsorted afterwards.
    pub fn load(&mut self, row: &[f32]) {
        self.data.clear();
        self.data.extend(row.iter().enumerate().map(|(id, &logit)| sys::llama_token_data {
            id: id as sys::llama_token,
            logit,
            p: 0.0,
        }));
        self.sorted = false;
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn entries(&self) -> &[sys::llama_token_data] {
        &self.data
    }

    /// Mutable entry access. A caller that perturbs the ordering must also
    /// clear the sorted flag.
    pub fn entries_mut(&mut self) -> &mut [sys::llama_token_data] {
        &mut self.data
    }

    pub fn is_sorted(&self) -> bool {
        self.sorted
    }

    pub fn set_sorted(&mut self, sorted: bool) {
        self.sorted = sorted;
    }

    /// Shrink to the first `keep` entries; at least one always survives.
    pub fn truncate(&mut self, keep: usize) {
        self.data.truncate(keep.max(1));
    }

    /// Sort descending by logit, once.
    pub fn sort_by_logit(&mut self) {
        if self.sorted {
            return;
        }
        self.data.sort_unstable_by(|a, b| {
            b.logit.partial_cmp(&a.logit).unwrap_or(std::cmp::Ordering::Equal)
        });
        self.sorted = true;
    }

    /// Fill the probability field via softmax over the current logits.
    pub fn softmax(&mut self) {
        let Some(max) = self.data.iter().map(|c| c.logit).reduce(f32::max) else {
            return;
        };
        let mut denom = 0.0f32;
        for entry in &mut self.data {
            entry.p = (entry.logit - max).exp();
            denom += entry.p;
        }
        if denom > 0.0 {
            for entry in &mut self.data {
                entry.p /= denom;
            }
        }
    }

    /// Raw view for the native terminal samplers.
    pub(crate) fn as_array(&mut self) -> sys::llama_token_data_array {
        sys::llama_token_data_array {
            data: self.data.as_mut_ptr(),
            size: self.data.len(),
            sorted: self.sorted,
        }
    }

    /// Adopt mutations a native sampler made through the raw view.
    pub(crate) fn sync_from(&mut self, array: &sys::llama_token_data_array) {
        debug_assert!(array.size <= self.data.len());
        self.data.truncate(array.size);
        self.sorted = array.sorted;
    }
}

#[cfg(test)]
mod tests {
    use super::CandidateBuffer;

    #[test]
    fn load_resets_state() {
        let mut buf = CandidateBuffer::new(4);
        buf.load(&[0.1, 0.4, 0.2]);
        buf.sort_by_logit();
        assert!(buf.is_sorted());

        buf.load(&[1.0, 2.0]);
        assert_eq!(buf.len(), 2);
        assert!(!buf.is_sorted());
        assert_eq!(buf.entries()[0].id, 0);
        assert_eq!(buf.entries()[1].logit, 2.0);
    }

    #[test]
    fn sort_orders_descending_and_sets_flag() {
        let mut buf = CandidateBuffer::new(4);
        buf.load(&[0.1, 0.4, 0.2, 0.3]);
        buf.sort_by_logit();
        let ids: Vec<i32> = buf.entries().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 3, 2, 0]);
        assert!(buf.is_sorted());
    }

    #[test]
    fn softmax_probabilities_sum_to_one() {
        let mut buf = CandidateBuffer::new(3);
        buf.load(&[1.0, 2.0, 3.0]);
        buf.softmax();
        let total: f32 = buf.entries().iter().map(|c| c.p).sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(buf.entries()[2].p > buf.entries()[0].p);
    }

    #[test]
    fn truncate_keeps_at_least_one() {
        let mut buf = CandidateBuffer::new(3);
        buf.load(&[1.0, 2.0, 3.0]);
        buf.truncate(0);
        assert_eq!(buf.len(), 1);
    }
}
