#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use crate::error::GraderError;

peg::parser! {
    /// grammars for the grade token embedded in grading replies
    pub grammar reply() for str {
        /// matches any number of whitespace characters
        rule whitespace() = quiet!{[' ' | '\n' | '\t' | '\r']*}

        /// matches a decimal float with optional sign, fraction and exponent
        rule number() -> f64
            = n:$(
                ['+' | '-']?
                (['0'..='9']+ ("." ['0'..='9']*)? / "." ['0'..='9']+)
                (['e' | 'E'] ['+' | '-']? ['0'..='9']+)?
            )
            {? n.parse::<f64>().or(Err("number")) }

        /// label part of a marker, never empty once trimmed and never
        /// holding a second `<`
        rule label() -> &'input str
            = l:$([^ ':' | '<']+) {? if l.trim().is_empty() { Err("label") } else { Ok(l.trim()) } }

        /// returns the text between the first `<` and the `>` that follows it
        pub rule first_marker() -> &'input str
            = [^ '<']* "<" m:$([^ '>']*) ">" [_]* { m }

        /// parses the inside of a marker, eg. `grade: 8.5`
        pub rule marker() -> (&'input str, f64)
            = l:label() ":" whitespace() n:number() whitespace() { (l, n) }
    }
}

peg::parser! {
    /// a small CSV grammar (RFC 4180 quoting, any line ending, optional BOM)
    pub grammar csv() for str {
        /// matches any line ending
        rule eol() = "\r\n" / "\n" / "\r"

        /// matches a double-quoted field, `""` being an escaped quote
        rule quoted() -> String
            = "\"" s:("\"\"" { '"' } / c:[^ '"'] { c })* "\"" { s.into_iter().collect() }

        /// matches an unquoted field, possibly empty
        rule bare() -> String
            = s:$([^ ',' | '"' | '\r' | '\n']*) { s.to_string() }

        /// matches a single field
        rule field() -> String
            = quoted() / bare()

        /// matches one comma-separated record
        rule record() -> Vec<String>
            = field() ++ ","

        /// parses a whole document into records; blank lines come back as a
        /// single empty field
        pub rule document() -> Vec<Vec<String>>
            = "\u{feff}"? r:(record() ** eol()) eol()? { r }
    }
}

/// Extracts the numeric grade from a grading reply.
///
/// The reply must contain a `<label:number>` marker. Only the first pair of
/// angle brackets is looked at; anything other than a label, a colon and a
/// finite number inside it is rejected.
pub fn parse_grade(text: &str) -> Result<f64, GraderError> {
    let segment = reply::first_marker(text).map_err(|_| {
        if text.contains('<') {
            GraderError::MalformedReply("grade marker is missing its closing `>`".into())
        } else {
            GraderError::MalformedReply("no `<label:number>` grade marker found".into())
        }
    })?;

    if !segment.contains(':') {
        return Err(GraderError::MalformedReply(format!(
            "grade marker `<{segment}>` has no `:` separator"
        )));
    }

    let (_, grade) = reply::marker(segment).map_err(|e| {
        GraderError::MalformedReply(format!(
            "grade marker `<{segment}>` is not of the form `<label:number>` ({e})"
        ))
    })?;

    if !grade.is_finite() {
        return Err(GraderError::MalformedReply(format!(
            "grade marker `<{segment}>` does not hold a finite number"
        )));
    }

    Ok(grade)
}

/// Parses CSV text into records, dropping blank lines.
pub fn parse_csv(text: &str) -> anyhow::Result<Vec<Vec<String>>> {
    let records = csv::document(text).map_err(|e| anyhow::anyhow!("Malformed CSV: {e}"))?;

    Ok(records
        .into_iter()
        .filter(|r| !(r.len() == 1 && r[0].trim().is_empty()))
        .collect())
}
