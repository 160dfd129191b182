/// Where a converted configuration should be placed.
///
/// `Default` lets the converter apply its own naming convention; `Explicit` overrides it with
/// exactly the given values, empty strings included.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AddressingHint {
    #[default]
    Default,
    Explicit { tenant: String, prefix: String },
}

impl AddressingHint {
    /// Build a hint from the two optional transport fields.
    ///
    /// Absent and empty are equivalent. Both empty selects `Default`; anything else is
    /// `Explicit`, with the missing side passed through as `""`. An explicit hint with both
    /// sides empty cannot be expressed through this rule; use [`Self::explicit`] for that.
    #[must_use]
    pub fn from_parts(tenant: Option<String>, prefix: Option<String>) -> Self {
        let tenant = tenant.unwrap_or_default();
        let prefix = prefix.unwrap_or_default();
        if tenant.is_empty() && prefix.is_empty() {
            AddressingHint::Default
        } else {
            AddressingHint::Explicit { tenant, prefix }
        }
    }

    #[must_use]
    pub fn explicit(tenant: impl Into<String>, prefix: impl Into<String>) -> Self {
        AddressingHint::Explicit {
            tenant: tenant.into(),
            prefix: prefix.into(),
        }
    }

    #[must_use]
    pub fn is_default(&self) -> bool {
        matches!(self, AddressingHint::Default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_or_empty_pair_selects_default() {
        assert_eq!(AddressingHint::from_parts(None, None), AddressingHint::Default);
        assert_eq!(
            AddressingHint::from_parts(Some(String::new()), Some(String::new())),
            AddressingHint::Default
        );
        assert_eq!(
            AddressingHint::from_parts(Some(String::new()), None),
            AddressingHint::Default
        );
    }

    #[test]
    fn any_non_empty_side_selects_explicit_with_empty_passthrough() {
        assert_eq!(
            AddressingHint::from_parts(Some("t".to_string()), None),
            AddressingHint::explicit("t", "")
        );
        assert_eq!(
            AddressingHint::from_parts(None, Some("/v1".to_string())),
            AddressingHint::explicit("", "/v1")
        );
        assert_eq!(
            AddressingHint::from_parts(Some("acme".to_string()), Some("/v1".to_string())),
            AddressingHint::explicit("acme", "/v1")
        );
    }

    #[test]
    fn whitespace_is_not_trimmed() {
        // Values are passed through verbatim; only the empty string counts as "not supplied".
        assert_eq!(
            AddressingHint::from_parts(Some(" ".to_string()), None),
            AddressingHint::explicit(" ", "")
        );
    }

    #[test]
    fn explicit_empty_both_is_constructible_programmatically() {
        let hint = AddressingHint::explicit("", "");
        assert!(!hint.is_default());
    }
}
