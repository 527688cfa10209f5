//! Redis-style glob matching for key patterns.
//!
//! Supports `*`, `?`, `[abc]`, `[^abc]`, `[a-z]` and `\` escapes, the same
//! subset Redis applies to `KEYS`, `SCAN MATCH` and `PSUBSCRIBE`.

/// Check if a pattern matches a string (glob-style).
///
/// Backtracks only to the most recent `*`, so matching stays polynomial in
/// the pattern and key lengths however many stars the pattern holds.
pub fn pattern_matches(pattern: &str, s: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let s: Vec<char> = s.chars().collect();

    let (mut pi, mut si) = (0, 0);
    // Pattern position after the last `*` and the key position it resumes from.
    let mut star: Option<(usize, usize)> = None;

    while si < s.len() {
        if pattern.get(pi) == Some(&'*') {
            pi += 1;
            star = Some((pi, si));
            continue;
        }
        if let Some(next) = match_one(&pattern, pi, s[si]) {
            pi = next;
            si += 1;
            continue;
        }
        match star {
            Some((star_pi, star_si)) => {
                pi = star_pi;
                si = star_si + 1;
                star = Some((star_pi, si));
            }
            None => return false,
        }
    }

    pattern[pi.min(pattern.len())..].iter().all(|&p| p == '*')
}

/// Match one key character against the pattern token at `pi`.
///
/// Returns the pattern position after the token, or `None` on mismatch.
fn match_one(pattern: &[char], pi: usize, c: char) -> Option<usize> {
    let &p = pattern.get(pi)?;
    match p {
        '?' => Some(pi + 1),
        '[' => {
            let (matched, after_class) = match_class(&pattern[pi + 1..], c);
            matched.then(|| pattern.len() - after_class.len())
        }
        '\\' => match pattern.get(pi + 1) {
            Some(&escaped) => (escaped == c).then_some(pi + 2),
            // A trailing backslash matches a literal backslash.
            None => (c == '\\').then_some(pi + 1),
        },
        literal => (literal == c).then_some(pi + 1),
    }
}

/// Match `c` against the class body starting right after `[`.
///
/// Returns whether it matched and the pattern remaining after the closing `]`.
fn match_class(body: &[char], c: char) -> (bool, &[char]) {
    let (negated, mut i) = match body.first() {
        Some('^') => (true, 1),
        _ => (false, 0),
    };
    let mut matched = false;

    while i < body.len() && body[i] != ']' {
        if body[i] == '\\' && i + 1 < body.len() {
            matched |= body[i + 1] == c;
            i += 2;
        } else if i + 2 < body.len() && body[i + 1] == '-' && body[i + 2] != ']' {
            let (lo, hi) = if body[i] <= body[i + 2] {
                (body[i], body[i + 2])
            } else {
                (body[i + 2], body[i])
            };
            matched |= (lo..=hi).contains(&c);
            i += 3;
        } else {
            matched |= body[i] == c;
            i += 1;
        }
    }

    // Skip the closing bracket; an unterminated class consumes the rest.
    let rest = if i < body.len() { &body[i + 1..] } else { &[] };
    (matched != negated, rest)
}
