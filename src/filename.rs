//! Output file naming for downloaded statements.
//!
//! Payee labels scraped from the report look like `"Acme Co - Statement"`.
//! Only the part before the first `" - "` names the payee.

use std::collections::HashSet;

const LABEL_DELIMITER: &str = " - ";

/// Build a file-name stem for a payee label.
///
/// ```
/// use paytrust_exporter::filename::make_file_name;
///
/// assert_eq!(make_file_name("Acme Co - Statement"), "Acme_Co");
/// assert_eq!(make_file_name("A/B Corp"), "A-B_Corp");
/// ```
pub fn make_file_name(label: &str) -> String {
    let head = label
        .split_once(LABEL_DELIMITER)
        .map(|(head, _)| head)
        .unwrap_or(label);
    sanitize_component(head)
}

/// Replace path separators with `-` and whitespace runs with `_`.
pub fn sanitize_component(text: &str) -> String {
    text.split_whitespace()
        .map(|word| word.replace(['/', '\\'], "-"))
        .collect::<Vec<_>>()
        .join("_")
}

/// File name for one bill variant of a payee.
pub fn statement_file_name(payee: &str, variant_label: &str) -> String {
    let variant = sanitize_component(variant_label);
    if variant.is_empty() {
        format!("{payee}.pdf")
    } else {
        format!("{payee}_{variant}.pdf")
    }
}

/// Why a payee was not exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Listed in the configured skip-list.
    Excluded,
    /// Already handled earlier in this run.
    Duplicate,
    /// The label sanitised to nothing.
    Unnamed,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Excluded => write!(f, "excluded by skip list"),
            SkipReason::Duplicate => write!(f, "already exported"),
            SkipReason::Unnamed => write!(f, "no payee name"),
        }
    }
}

/// Decides which payees get exported.
///
/// The report lists one row per payment, so the same payee shows up many
/// times. Each bill modal already holds every statement for the payee.
#[derive(Debug, Default)]
pub struct PayeeFilter {
    skip: HashSet<String>,
    seen: HashSet<String>,
    skip_duplicates: bool,
}

impl PayeeFilter {
    pub fn new<I, S>(skip_list: I, skip_duplicates: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let skip = skip_list
            .into_iter()
            .map(|s| s.as_ref().trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self {
            skip,
            seen: HashSet::new(),
            skip_duplicates,
        }
    }

    /// Returns the payee file name to use, or why the label is skipped.
    ///
    /// A payee that passes is recorded, so the next call with the same
    /// payee reports [`SkipReason::Duplicate`].
    pub fn admit(&mut self, label: &str) -> Result<String, SkipReason> {
        let name = make_file_name(label);
        if name.is_empty() {
            return Err(SkipReason::Unnamed);
        }

        let raw = label.trim().to_lowercase();
        let head = raw
            .split_once(LABEL_DELIMITER)
            .map(|(head, _)| head.trim().to_string())
            .unwrap_or_else(|| raw.clone());
        if self.skip.contains(&raw)
            || self.skip.contains(&head)
            || self.skip.contains(&name.to_lowercase())
        {
            return Err(SkipReason::Excluded);
        }

        if !self.seen.insert(name.clone()) && self.skip_duplicates {
            return Err(SkipReason::Duplicate);
        }

        Ok(name)
    }

    pub fn seen(&self) -> usize {
        self.seen.len()
    }
}
