//! Wildcard patterns for names and descriptors, and the templates that build replacements
//!
//! Patterns use two wildcards:
//!
//!   - `*` matches any sequence of characters not containing a separator (`/`, `;`, `(`, `)`), so
//!     it stays inside a single package segment (`java/time/*` matches `java/time/Instant` but not
//!     `java/time/chrono/Era`) and, in descriptors, inside a single class name
//!   - `**` matches any sequence of characters at all
//!
//! Every wildcard captures what it matched. Replacement templates refer back to these captures
//! either with an explicit `<n>` (counting from 1) or with a wildcard of their own, which takes
//! the next capture in order. So `java/time/*` → `org/threeten/bp/*` maps `java/time/Instant` to
//! `org/threeten/bp/Instant`.

use super::Error;

const SEPARATORS: [char; 4] = ['/', ';', '(', ')'];

/// Compiled pattern
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Matcher {
    /// Matches exactly one string
    Fixed(String),

    /// Matches only the empty string
    Empty,

    /// Matches by decomposing the candidate into literal and wildcard segments
    Variable(Vec<Segment>),

    /// Matches everything (only used for the `**` descriptor shorthand)
    Constant,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Literal(String),

    /// `*`
    Star,

    /// `**`
    DoubleStar,
}

/// Outcome of matching a candidate against a pattern
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct MatchResult {
    pub matched: bool,

    /// What each wildcard consumed, in order
    ///
    /// Patterns without wildcards expose the whole candidate as their single capture.
    pub captures: Vec<String>,
}

impl MatchResult {
    pub const NO_MATCH: MatchResult = MatchResult {
        matched: false,
        captures: vec![],
    };

    fn whole(candidate: &str) -> MatchResult {
        MatchResult {
            matched: true,
            captures: vec![candidate.to_owned()],
        }
    }
}

impl Matcher {
    /// Compile a pattern
    pub fn new(pattern: &str) -> Matcher {
        if pattern.is_empty() {
            return Matcher::Empty;
        }
        if !pattern.contains('*') {
            return Matcher::Fixed(pattern.to_owned());
        }

        let mut segments = vec![];
        let mut literal = String::new();
        let mut chars = pattern.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '*' {
                literal.push(c);
                continue;
            }
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            if chars.peek() == Some(&'*') {
                chars.next();
                segments.push(Segment::DoubleStar);
            } else {
                segments.push(Segment::Star);
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Matcher::Variable(segments)
    }

    /// Compile a descriptor pattern, where `**` on its own means "any descriptor"
    pub fn descriptor(pattern: &str) -> Matcher {
        if pattern == "**" {
            Matcher::Constant
        } else {
            Matcher::new(pattern)
        }
    }

    /// Does the pattern contain wildcards?
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Matcher::Variable(_) | Matcher::Constant)
    }

    /// How many captures a successful match produces
    pub fn capture_count(&self) -> usize {
        match self {
            Matcher::Variable(segments) => segments
                .iter()
                .filter(|segment| !matches!(segment, Segment::Literal(_)))
                .count(),
            _ => 1,
        }
    }

    /// Match a candidate
    pub fn matches(&self, candidate: &str) -> MatchResult {
        match self {
            Matcher::Fixed(fixed) if fixed == candidate => MatchResult::whole(candidate),
            Matcher::Empty if candidate.is_empty() => MatchResult::whole(candidate),
            Matcher::Constant => MatchResult::whole(candidate),
            Matcher::Variable(segments) => {
                let mut captures = vec![];
                if match_segments(segments, candidate, &mut captures) {
                    MatchResult {
                        matched: true,
                        captures,
                    }
                } else {
                    MatchResult::NO_MATCH
                }
            }
            _ => MatchResult::NO_MATCH,
        }
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        self.matches(candidate).matched
    }
}

/// Greedy backtracking match, pushing one capture per wildcard
fn match_segments(segments: &[Segment], candidate: &str, captures: &mut Vec<String>) -> bool {
    let (segment, rest) = match segments.split_first() {
        None => return candidate.is_empty(),
        Some(split) => split,
    };
    let limit = match segment {
        Segment::Literal(literal) => {
            return match candidate.strip_prefix(literal.as_str()) {
                Some(remaining) => match_segments(rest, remaining, captures),
                None => false,
            };
        }
        Segment::Star => candidate.find(&SEPARATORS[..]).unwrap_or(candidate.len()),
        Segment::DoubleStar => candidate.len(),
    };
    for end in (0..=limit).rev() {
        if !candidate.is_char_boundary(end) {
            continue;
        }
        captures.push(candidate[..end].to_owned());
        if match_segments(rest, &candidate[end..], captures) {
            return true;
        }
        captures.pop();
    }
    false
}

/// Compiled replacement string
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Template {
    /// Keep the candidate as is (the replacement was a lone `*` or `**`)
    Keep,

    /// Concatenate literal text and captures
    Parts(Vec<TemplatePart>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TemplatePart {
    Literal(String),

    /// Index into the captures (counting from 0)
    Capture(usize),
}

impl Template {
    /// Compile a replacement string against the number of captures its pattern produces
    ///
    /// Backreferences past the last capture are rejected here, rather than when applied.
    pub fn new(replacement: &str, capture_count: usize) -> Result<Template, Error> {
        if replacement == "*" || replacement == "**" {
            return Ok(Template::Keep);
        }

        let invalid = |reason: String| Error::InvalidPattern {
            pattern: replacement.to_owned(),
            reason,
        };
        let mut parts = vec![];
        let mut literal = String::new();
        let mut next_capture = 0;
        let mut rest = replacement;
        while let Some(c) = rest.chars().next() {
            if c == '*' {
                rest = rest.trim_start_matches('*');
                if next_capture >= capture_count {
                    return Err(invalid(format!(
                        "wildcard #{} has no corresponding wildcard in the pattern",
                        next_capture + 1
                    )));
                }
                flush(&mut literal, &mut parts);
                parts.push(TemplatePart::Capture(next_capture));
                next_capture += 1;
                continue;
            }
            if c == '<' {
                if let Some((digits, after)) = rest[1..].split_once('>') {
                    if !digits.is_empty() && digits.chars().all(|d| d.is_ascii_digit()) {
                        let index: usize = digits
                            .parse()
                            .map_err(|_| invalid(format!("bad backreference <{}>", digits)))?;
                        if index == 0 || index > capture_count {
                            return Err(invalid(format!(
                                "backreference <{}> but the pattern only has {} capture(s)",
                                index, capture_count
                            )));
                        }
                        flush(&mut literal, &mut parts);
                        parts.push(TemplatePart::Capture(index - 1));
                        rest = after;
                        continue;
                    }
                }
            }
            literal.push(c);
            rest = &rest[c.len_utf8()..];
        }
        flush(&mut literal, &mut parts);
        Ok(Template::Parts(parts))
    }

    /// Is the output derived from the candidate (as opposed to being a fixed string)?
    pub fn is_derived(&self) -> bool {
        match self {
            Template::Keep => true,
            Template::Parts(parts) => parts
                .iter()
                .any(|part| matches!(part, TemplatePart::Capture(_))),
        }
    }

    /// Fixed output, if the template doesn't depend on the candidate
    pub fn fixed(&self) -> Option<String> {
        match self {
            Template::Parts(_) if !self.is_derived() => Some(self.apply("", &[])),
            _ => None,
        }
    }

    /// Build the replacement for a candidate that matched with some captures
    pub fn apply(&self, candidate: &str, captures: &[String]) -> String {
        match self {
            Template::Keep => candidate.to_owned(),
            Template::Parts(parts) => {
                let mut output = String::new();
                for part in parts {
                    match part {
                        TemplatePart::Literal(literal) => output.push_str(literal),
                        TemplatePart::Capture(idx) => {
                            if let Some(capture) = captures.get(*idx) {
                                output.push_str(capture);
                            }
                        }
                    }
                }
                output
            }
        }
    }
}

fn flush(literal: &mut String, parts: &mut Vec<TemplatePart>) {
    if !literal.is_empty() {
        parts.push(TemplatePart::Literal(std::mem::take(literal)));
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn captures(pattern: &str, candidate: &str) -> Option<Vec<String>> {
        let result = Matcher::new(pattern).matches(candidate);
        if result.matched {
            Some(result.captures)
        } else {
            None
        }
    }

    #[test]
    fn fixed_patterns() {
        let matcher = Matcher::new("java/lang/String");
        assert_eq!(matcher, Matcher::Fixed(String::from("java/lang/String")));
        assert!(matcher.is_match("java/lang/String"));
        assert!(!matcher.is_match("java/lang/StringBuilder"));
        assert!(!matcher.is_match("java/lang/Strin"));
        assert!(!matcher.is_match(""));

        let empty = Matcher::new("");
        assert_eq!(empty, Matcher::Empty);
        assert!(empty.is_match(""));
        assert!(!empty.is_match("a"));
    }

    #[test]
    fn single_star_stays_in_segment() {
        assert_eq!(
            captures("java/time/*", "java/time/Instant"),
            Some(vec![String::from("Instant")])
        );
        assert_eq!(captures("java/time/*", "java/time/chrono/Era"), None);
        assert_eq!(captures("java/time/*", "java/time/"), Some(vec![String::new()]));
        assert_eq!(
            captures("java/*/*", "java/util/List"),
            Some(vec![String::from("util"), String::from("List")])
        );
    }

    #[test]
    fn double_star_crosses_segments() {
        assert_eq!(
            captures("java/time/**", "java/time/chrono/Era"),
            Some(vec![String::from("chrono/Era")])
        );
        assert_eq!(
            captures("**/Stream", "java/util/stream/Stream"),
            Some(vec![String::from("java/util/stream")])
        );
        assert!(Matcher::descriptor("**").is_match("(ILjava/lang/String;)V"));
        assert_eq!(Matcher::descriptor("**"), Matcher::Constant);
    }

    #[test]
    fn backtracking() {
        // The greedy first attempt eats the `Map` that the literal needs
        assert_eq!(
            captures("**Map*", "java/util/HashMapEntry"),
            Some(vec![String::from("java/util/Hash"), String::from("Entry")])
        );
        assert_eq!(
            captures("(*)*", "(I)Ljava/lang/String;"),
            None,
            "single star can't cross the package separators in the return type"
        );
        assert_eq!(
            captures("(*)**", "(I)Ljava/lang/String;"),
            Some(vec![String::from("I"), String::from("Ljava/lang/String;")])
        );
    }

    #[test]
    fn single_star_stays_in_descriptor_class() {
        let one_object = Matcher::descriptor("(L*;)V");
        assert_eq!(
            one_object.matches("(LA;)V").captures,
            vec![String::from("A")]
        );
        assert!(!one_object.is_match("(LA;LB;)V"));
        assert!(!one_object.is_match("(La/A;)V"));
        assert_eq!(
            captures("(L**;)V", "(La/A;)V"),
            Some(vec![String::from("a/A")])
        );
        assert_eq!(captures("(*)V", "(IJ)V"), Some(vec![String::from("IJ")]));
    }

    #[test]
    fn templates() {
        let matched = Matcher::new("java/time/*").matches("java/time/Instant");
        let template = Template::new("org/threeten/bp/*", 1).unwrap();
        assert!(template.is_derived());
        assert_eq!(
            template.apply("java/time/Instant", &matched.captures),
            "org/threeten/bp/Instant"
        );

        let swapped = Template::new("<2>/<1>", 2).unwrap();
        let captures = vec![String::from("a"), String::from("b")];
        assert_eq!(swapped.apply("ignored", &captures), "b/a");

        let keep = Template::new("**", 0).unwrap();
        assert_eq!(keep, Template::Keep);
        assert_eq!(keep.apply("x/Y", &[]), "x/Y");

        // Method names with angle brackets are not backreferences
        let init = Template::new("<init>", 1).unwrap();
        assert!(!init.is_derived());
        assert_eq!(init.fixed(), Some(String::from("<init>")));
    }

    #[test]
    fn invalid_templates() {
        assert!(Template::new("<2>", 1).is_err());
        assert!(Template::new("<0>", 1).is_err());
        assert!(Template::new("a/*/*", 1).is_err());
        assert!(Template::new("a/*", 1).is_ok());
    }
}
