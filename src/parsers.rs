#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Best-effort parsing of free-text oracle responses and of written reports.
//!
//! Nothing here is exact: the oracle gives no format guarantees, so every
//! parser reports either [`ParseResult::Found`] or [`ParseResult::NotFound`]
//! and leaves the fallback policy to the caller.

use tracing::warn;

use crate::state::UnitMap;

/// Outcome of scanning free text for a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseResult<T> {
    /// Something recognizable was found.
    Found(T),
    /// Nothing recognizable was found.
    NotFound,
}

impl<T> ParseResult<T> {
    /// Whether a value was found.
    pub fn is_found(&self) -> bool {
        matches!(self, ParseResult::Found(_))
    }

    /// Converts into an `Option`.
    pub fn found(self) -> Option<T> {
        match self {
            ParseResult::Found(value) => Some(value),
            ParseResult::NotFound => None,
        }
    }

    /// Returns the found value or `default`.
    pub fn unwrap_or(self, default: T) -> T {
        self.found().unwrap_or(default)
    }

    /// Maps the found value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ParseResult<U> {
        match self {
            ParseResult::Found(value) => ParseResult::Found(f(value)),
            ParseResult::NotFound => ParseResult::NotFound,
        }
    }
}

impl<T: Default> ParseResult<T> {
    /// Returns the found value or `T::default()`.
    pub fn unwrap_or_default(self) -> T {
        self.found().unwrap_or_default()
    }
}

peg::parser! {
    /// grammars for scanning oracle responses and report lines.
    pub grammar parser() for str {
        /// matches any sequence of 1 or more ASCII digits
        rule digits() -> &'input str
            = $(['0'..='9']+)

        /// matches anything that is not a digit
        rule filler()
            = quiet!{[^ '0'..='9']*}

        /// collects every run of digits, in order of appearance
        pub rule digit_runs() -> Vec<&'input str>
            = filler() runs:(d:digits() filler() { d })* { runs }

        /// matches the end of input
        rule eof() = ![_]

        /// parses an `Evaluation for <unit>:` report header, returning the unit name
        pub rule report_header() -> &'input str
            = "Evaluation for " name:$((!(":" eof()) [_])+) ":" eof() { name }

        /// parses a `Total Marks: <number>` report footer
        pub rule total_line() -> f64
            = "Total Marks:" [' ']* n:$([^ ' ']+) [' ']* eof()
            {? n.parse().or(Err("f64")) }
    }
}

/// Scans `text` for digit sequences and returns them in order.
///
/// Every integer counts, including criterion numbers or line numbers that
/// happen to appear in the prose. Callers that want a stricter reading must
/// ask the oracle to restate marks in a delimited list first.
pub fn extract_marks(text: &str) -> ParseResult<Vec<String>> {
    match parser::digit_runs(text) {
        Ok(runs) if !runs.is_empty() => {
            ParseResult::Found(runs.into_iter().map(str::to_owned).collect())
        }
        _ => ParseResult::NotFound,
    }
}

/// Returns the unit name if `line` declares a unit with `keyword`.
///
/// A declaration is any line whose second whitespace-separated token equals
/// `keyword`, e.g. `public class Calculator {`. The name is the third token,
/// cut at the first `(` or `{`.
pub fn unit_declaration<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let mut tokens = line.split_whitespace();
    let _modifier = tokens.next()?;
    if tokens.next()? != keyword {
        return None;
    }
    let raw = tokens.next()?;
    let name = raw.split(['(', '{']).next().unwrap_or_default();
    if name.is_empty() { None } else { Some(name) }
}

/// Splits an oracle response listing code units into `unit -> source`.
///
/// Lines before the first declaration are dropped. Each block runs from its
/// declaration line up to, not including, the next declaration line. A unit
/// declared twice keeps its first position and gets the later block appended.
pub fn parse_units(response: &str, keyword: &str) -> ParseResult<UnitMap> {
    let mut units = UnitMap::new();
    let mut current: Option<(&str, Vec<&str>)> = None;

    for line in response.lines() {
        if let Some(name) = unit_declaration(line, keyword) {
            if let Some((prev, block)) = current.take() {
                push_block(&mut units, prev, &block);
            }
            current = Some((name, vec![line]));
        } else if let Some((_, block)) = current.as_mut() {
            block.push(line);
        }
    }

    if let Some((prev, block)) = current.take() {
        push_block(&mut units, prev, &block);
    }

    if units.is_empty() {
        ParseResult::NotFound
    } else {
        ParseResult::Found(units)
    }
}

/// Adds one parsed block to `units`, merging repeated declarations.
fn push_block(units: &mut UnitMap, name: &str, block: &[&str]) {
    if units.contains_key(name) {
        warn!("Unit `{name}` was declared more than once; appending the later block");
    }
    units.append(name, block.join("\n"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digit_runs_in_order() {
        let runs = parser::digit_runs("Criterion 1: 4/5, Criterion 2: 3").unwrap();
        assert_eq!(runs, vec!["1", "4", "5", "2", "3"]);
    }

    #[test]
    fn digit_runs_on_plain_text_is_empty() {
        assert!(parser::digit_runs("no numbers here").unwrap().is_empty());
        assert!(parser::digit_runs("").unwrap().is_empty());
    }

    #[test]
    fn extract_marks_not_found_without_digits() {
        assert_eq!(extract_marks("Looks good overall."), ParseResult::NotFound);
    }

    #[test]
    fn declaration_needs_keyword_in_second_position() {
        assert_eq!(unit_declaration("public class Calculator {", "class"), Some("Calculator"));
        assert_eq!(unit_declaration("  final class Helper{", "class"), Some("Helper"));
        assert_eq!(unit_declaration("class Calculator {", "class"), None);
        assert_eq!(unit_declaration("public class", "class"), None);
        assert_eq!(unit_declaration("public interface Shape {", "class"), None);
        assert_eq!(unit_declaration("public interface Shape {", "interface"), Some("Shape"));
    }

    #[test]
    fn declaration_name_is_cut_at_paren_or_brace() {
        assert_eq!(unit_declaration("data class Point(val x: Int)", "class"), Some("Point"));
        assert_eq!(unit_declaration("public class {", "class"), None);
    }

    #[test]
    fn report_lines() {
        assert_eq!(parser::report_header("Evaluation for Calculator:"), Ok("Calculator"));
        assert!(parser::report_header("Evaluation for Calculator: extra").is_err());
        assert_eq!(parser::total_line("Total Marks: 18.0"), Ok(18.0));
        assert!(parser::total_line("Total Marks: many").is_err());
    }
}
