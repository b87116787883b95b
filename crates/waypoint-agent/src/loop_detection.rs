//! Detects repetitive tool-calling loops.
//!
//! Signatures are one per executed tool call: the tool name plus a
//! deterministic hash of the raw argument string. Detection inspects the
//! last `window` signatures and, for each pattern length 1..=3, counts how
//! many times the tail pattern repeats consecutively going backward. Three
//! or more exact repetitions is a loop.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

const MIN_REPETITIONS: usize = 3;
const MAX_PATTERN_LEN: usize = 3;

/// Tracks tool-call signatures and answers "are we looping?".
pub struct LoopDetector {
    window: usize,
    signatures: Vec<String>,
}

impl LoopDetector {
    pub fn new(window: usize) -> Self {
        Self {
            window,
            signatures: Vec::new(),
        }
    }

    /// Record a tool call and check whether a loop is now present.
    pub fn record_and_check(&mut self, tool_name: &str, raw_arguments: &str) -> bool {
        self.signatures
            .push(signature(tool_name, raw_arguments));
        detect_loop(&self.signatures, self.window)
    }

    /// Reset accumulated signatures (e.g. when a new input begins).
    pub fn reset(&mut self) {
        self.signatures.clear();
    }
}

/// Signature of one tool call: name + hash of its raw argument string.
pub fn signature(tool_name: &str, raw_arguments: &str) -> String {
    let mut hasher = DefaultHasher::new();
    raw_arguments.hash(&mut hasher);
    format!("{}:{:016x}", tool_name, hasher.finish())
}

/// Pure detection over a signature list.
pub fn detect_loop(signatures: &[String], window: usize) -> bool {
    let start = signatures.len().saturating_sub(window);
    let tail = &signatures[start..];

    for pattern_len in 1..=MAX_PATTERN_LEN {
        if tail.len() < pattern_len * MIN_REPETITIONS {
            continue;
        }
        let pattern = &tail[tail.len() - pattern_len..];
        let mut repetitions = 1;
        let mut pos = tail.len() as isize - 2 * pattern_len as isize;
        while pos >= 0 && &tail[pos as usize..pos as usize + pattern_len] == pattern {
            repetitions += 1;
            pos -= pattern_len as isize;
        }
        if repetitions >= MIN_REPETITIONS {
            return true;
        }
    }
    false
}

/// The steering text appended when a loop fires.
pub fn loop_guidance() -> String {
    "[Loop detected] The same tool calls are repeating with identical arguments. \
     Stop and try a different approach or tool."
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sigs(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| signature(n, "{}")).collect()
    }

    #[test]
    fn no_loop_with_varied_calls() {
        let s = sigs(&["read_file", "write_file", "shell", "grep"]);
        assert!(!detect_loop(&s, 10));
    }

    #[test]
    fn length_one_pattern_fires_at_three_repetitions() {
        let s = sigs(&["read_file", "read_file", "read_file"]);
        assert!(detect_loop(&s, 10));
    }

    #[test]
    fn two_repetitions_do_not_fire() {
        let s = sigs(&["read_file", "read_file"]);
        assert!(!detect_loop(&s, 10));
    }

    #[test]
    fn six_identical_signatures_fire() {
        let s: Vec<String> = (0..6).map(|_| signature("read", r#"{"path":"/a"}"#)).collect();
        assert!(detect_loop(&s, 10));
    }

    #[test]
    fn different_signature_near_tail_breaks_length_one_loop() {
        let a = signature("read", r#"{"path":"/a"}"#);
        let b = signature("read", r#"{"path":"/b"}"#);
        // Backward repetition from the tail stops at the differing call
        let s = vec![a.clone(), a.clone(), a.clone(), b, a];
        assert!(!detect_loop(&s, 6));
    }

    #[test]
    fn length_two_pattern_fires() {
        // a b a b a b => pattern [a, b] repeats 3 times
        let a = signature("read", r#"{"path":"/a"}"#);
        let b = signature("shell", r#"{"command":"ls"}"#);
        let s = vec![a.clone(), b.clone(), a.clone(), b.clone(), a, b];
        assert!(detect_loop(&s, 10));
    }

    #[test]
    fn length_three_pattern_fires() {
        let a = signature("a", "{}");
        let b = signature("b", "{}");
        let c = signature("c", "{}");
        let s = vec![
            a.clone(),
            b.clone(),
            c.clone(),
            a.clone(),
            b.clone(),
            c.clone(),
            a,
            b,
            c,
        ];
        assert!(detect_loop(&s, 10));
    }

    #[test]
    fn alternating_pair_does_not_fire_as_length_one() {
        let a = signature("a", "{}");
        let b = signature("b", "{}");
        // a b a b: length-2 pattern only repeats twice, no loop yet
        let s = vec![a.clone(), b.clone(), a, b];
        assert!(!detect_loop(&s, 10));
    }

    #[test]
    fn window_bounds_inspection() {
        // Loop material exists but lies outside the window
        let a = signature("a", "{}");
        let b = signature("b", "{}");
        let mut s = vec![a.clone(), a.clone(), a.clone()];
        s.extend(vec![b.clone(), a.clone(), b.clone(), a]);
        // Window of 4 sees only [a, b, a] tail-ish mix, no 3 repetitions
        assert!(!detect_loop(&s, 4));
    }

    #[test]
    fn same_tool_different_args_distinct_signatures() {
        let s1 = signature("read_file", r#"{"path":"/a.rs"}"#);
        let s2 = signature("read_file", r#"{"path":"/b.rs"}"#);
        assert_ne!(s1, s2);
    }

    #[test]
    fn detector_reset_clears_state() {
        let mut det = LoopDetector::new(10);
        assert!(!det.record_and_check("read", "{}"));
        assert!(!det.record_and_check("read", "{}"));
        det.reset();
        assert!(!det.record_and_check("read", "{}"));
        assert!(!det.record_and_check("read", "{}"));
        assert!(det.record_and_check("read", "{}"));
    }
}
