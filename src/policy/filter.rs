//! Destination filter
//!
//! Matches a destination host against one optional glob pattern. `*` matches
//! any run of characters (including none), `?` exactly one character, and
//! everything else literally. Matching is case-insensitive and covers the
//! whole host; ports never take part.

/// Optional single allow pattern
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationFilter {
    pattern: Option<Vec<char>>,
}

impl DestinationFilter {
    /// Create a filter. `None` or an empty pattern allows every host.
    pub fn new(pattern: Option<&str>) -> Self {
        let pattern = pattern
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| p.to_lowercase().chars().collect());
        Self { pattern }
    }

    /// Whether a pattern is configured
    pub fn is_enabled(&self) -> bool {
        self.pattern.is_some()
    }

    /// Whether `host` may be reached
    pub fn allowed(&self, host: &str) -> bool {
        match &self.pattern {
            None => true,
            Some(pattern) => {
                let host: Vec<char> = host.to_lowercase().chars().collect();
                glob_match(pattern, &host)
            }
        }
    }
}

/// Iterative wildcard match with single-star backtracking.
fn glob_match(pattern: &[char], text: &[char]) -> bool {
    let (mut p, mut t) = (0, 0);
    let mut star: Option<usize> = None;
    let mut star_text = 0;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            star_text = t;
            p += 1;
        } else if let Some(star_pos) = star {
            // let the last star absorb one more character
            p = star_pos + 1;
            star_text += 1;
            t = star_text;
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }

    p == pattern.len()
}
