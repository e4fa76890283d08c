/// Drops the part of a continuation that repeats the end of delivered text.
///
/// The first characters of a continuation are held back until at least as many
/// characters as the comparison tail are buffered (or the segment ends). Then
/// the longest suffix of the tail that equals a prefix of the buffered text, if
/// at least `min_overlap` long, is removed. A shorter overlap is removed only
/// when delivered text stopped mid-word and the continuation restarts that word.
/// Everything after that passes through.
#[derive(Debug, Clone)]
pub struct OverlapTrimmer {
    tail: Vec<char>,
    pending: String,
    min_overlap: usize,
    resolved: bool,
}

impl OverlapTrimmer {
    /// `delivered` is the text sent so far; only its last `max_overlap` chars matter.
    pub fn new(delivered: &str, min_overlap: usize, max_overlap: usize) -> Self {
        let total = delivered.chars().count();
        let tail: Vec<char> = delivered.chars().skip(total.saturating_sub(max_overlap)).collect();
        let min_overlap = min_overlap.max(1);
        Self { resolved: tail.len() < min_overlap, tail, pending: String::new(), min_overlap }
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    /// Feed continuation text; returns what may be emitted now.
    pub fn push(&mut self, text: &str) -> String {
        if self.resolved {
            return text.to_string();
        }
        self.pending.push_str(text);
        if self.pending.chars().count() >= self.tail.len() {
            return self.resolve();
        }
        String::new()
    }

    /// Segment ended: resolve with whatever is buffered.
    pub fn finish(&mut self) -> String {
        if self.resolved {
            return String::new();
        }
        self.resolve()
    }

    fn resolve(&mut self) -> String {
        self.resolved = true;
        let pending = std::mem::take(&mut self.pending);
        let head: Vec<char> = pending.chars().take(self.tail.len()).collect();
        let overlap = longest_overlap(&self.tail, &head, self.min_overlap);
        if overlap > 0 {
            tracing::debug!("[Stream] Dropping {} overlapping chars from continuation", overlap);
        }
        pending.chars().skip(overlap).collect()
    }
}

/// Longest `k >= min` with `tail[len-k..] == head[..k]`, else the length of a
/// restarted trailing word, else 0.
fn longest_overlap(tail: &[char], head: &[char], min: usize) -> usize {
    let upper = tail.len().min(head.len());
    (min..=upper)
        .rev()
        .find(|&k| tail[tail.len() - k..] == head[..k])
        .unwrap_or_else(|| restarted_word(tail, head, min))
}

/// `tail` ends in a partial word of 2..min chars and `head` spells a longer word
/// starting with it ("brown fo" + "fox").
fn restarted_word(tail: &[char], head: &[char], min: usize) -> usize {
    let word = tail.iter().rev().take_while(|c| c.is_alphanumeric()).count();
    if word < 2 || word >= min || word >= tail.len() || head.len() <= word {
        return 0;
    }
    if head[..word] == tail[tail.len() - word..] && head[word].is_alphanumeric() {
        word
    } else {
        0
    }
}
