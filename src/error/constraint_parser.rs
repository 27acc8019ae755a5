use regex::Regex;
use std::sync::OnceLock;

/// Extracts entity, field and value details from PostgreSQL constraint
/// violations so they can be reported as structured errors.
///
/// Constraint names follow the PostgreSQL defaults used by the migrations:
/// `<table>_<column>_key` for unique constraints, `<table>_<column>_fkey` for
/// foreign keys and `<table>_<column>_check` for check constraints.
pub struct ConstraintParser;

struct RegexPatterns {
    key_value: Regex,
    column_name: Regex,
    relation_name: Regex,
    check_constraint: Regex,
}

impl RegexPatterns {
    fn new() -> Option<Self> {
        Some(Self {
            // "Key (field)=(value)" in the DETAIL line
            key_value: Regex::new(r"Key \(([^)]+)\)=\(([^)]*)\)").ok()?,
            column_name: Regex::new(r#"column "([^"]+)""#).ok()?,
            // "table" in FK messages, "relation" in check and not-null messages
            relation_name: Regex::new(r#"(?:table|relation) "([^"]+)""#).ok()?,
            check_constraint: Regex::new(r#"check constraint "([^"]+)""#).ok()?,
        })
    }
}

static REGEX_PATTERNS: OnceLock<Option<RegexPatterns>> = OnceLock::new();

/// Tables owned by this service, longest first so `order_items` wins over `orders`.
const KNOWN_TABLES: &[&str] = &["order_items", "products", "orders", "users"];

impl ConstraintParser {
    fn patterns() -> Option<&'static RegexPatterns> {
        REGEX_PATTERNS.get_or_init(RegexPatterns::new).as_ref()
    }

    /// Parses a unique violation into `(entity, field, value)`.
    ///
    /// ```
    /// use storefront::error::ConstraintParser;
    ///
    /// let message = "duplicate key value violates unique constraint \"orders_order_number_key\"\nDETAIL: Key (order_number)=(ORD-260101-120000-1234) already exists.";
    /// let result = ConstraintParser::parse_unique_violation(message, Some("orders_order_number_key"));
    /// assert_eq!(
    ///     result,
    ///     Some(("orders".to_string(), "order_number".to_string(), "ORD-260101-120000-1234".to_string()))
    /// );
    /// ```
    pub fn parse_unique_violation(
        message: &str,
        constraint_name: Option<&str>,
    ) -> Option<(String, String, String)> {
        if let Some((entity, field)) =
            constraint_name.and_then(|c| Self::split_constraint_name(c, "_key"))
        {
            let value = Self::extract_key_value(message)
                .map(|(_, value)| value)
                .unwrap_or_else(|| "duplicate_value".to_string());
            return Some((entity, field, value));
        }

        let (field, value) = Self::extract_key_value(message)?;
        let entity = Self::extract_relation(message).unwrap_or_else(|| "resource".to_string());
        Some((entity, field, value))
    }

    /// Parses a foreign key violation into `(entity, field, referenced_value)`.
    pub fn parse_foreign_key_violation(
        message: &str,
        constraint_name: Option<&str>,
    ) -> Option<(String, String, String)> {
        if let Some((entity, field)) =
            constraint_name.and_then(|c| Self::split_constraint_name(c, "_fkey"))
        {
            let value = Self::extract_key_value(message)
                .map(|(_, value)| value)
                .unwrap_or_else(|| "invalid_reference".to_string());
            return Some((entity, field, value));
        }

        let (field, value) = Self::extract_key_value(message)?;
        let entity = Self::extract_relation(message).unwrap_or_else(|| "resource".to_string());
        Some((entity, field, value))
    }

    /// Parses a not-null violation into `(entity, field)`.
    pub fn parse_not_null_violation(
        message: &str,
        constraint_name: Option<&str>,
    ) -> Option<(String, String)> {
        let field = Self::patterns()?
            .column_name
            .captures(message)?
            .get(1)?
            .as_str()
            .to_string();
        let entity = Self::extract_relation(message)
            .or_else(|| {
                constraint_name.and_then(|c| Self::split_table_prefix(c).map(|(table, _)| table))
            })
            .unwrap_or_else(|| "resource".to_string());
        Some((entity, field))
    }

    /// Parses a check violation into `(entity, field)`. Without a constraint
    /// name the one quoted in the message is used.
    pub fn parse_check_violation(
        message: &str,
        constraint_name: Option<&str>,
    ) -> Option<(String, String)> {
        match constraint_name {
            Some(constraint) => Self::split_constraint_name(constraint, "_check"),
            None => {
                let captures = Self::patterns()?.check_constraint.captures(message)?;
                Self::split_constraint_name(captures.get(1)?.as_str(), "_check")
            }
        }
    }

    /// Splits `<table>_<column><suffix>` into `(table, column)`.
    fn split_constraint_name(constraint: &str, suffix: &str) -> Option<(String, String)> {
        let stem = constraint.strip_suffix(suffix)?;
        Self::split_table_prefix(stem)
    }

    fn split_table_prefix(stem: &str) -> Option<(String, String)> {
        if let Some(table) = KNOWN_TABLES
            .iter()
            .find(|table| stem.starts_with(&format!("{table}_")))
        {
            let column = &stem[table.len() + 1..];
            return (!column.is_empty()).then(|| (table.to_string(), column.to_string()));
        }

        // Unknown tables: assume a single-word table name.
        let (table, column) = stem.split_once('_')?;
        (!table.is_empty() && !column.is_empty()).then(|| (table.to_string(), column.to_string()))
    }

    fn extract_key_value(message: &str) -> Option<(String, String)> {
        let captures = Self::patterns()?.key_value.captures(message)?;
        Some((
            captures.get(1)?.as_str().to_string(),
            captures.get(2)?.as_str().to_string(),
        ))
    }

    fn extract_relation(message: &str) -> Option<String> {
        Self::patterns()?
            .relation_name
            .captures(message)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_violation_keeps_multi_word_columns() {
        let message = "duplicate key value violates unique constraint \"orders_order_number_key\"\nDETAIL: Key (order_number)=(ORD-260101-120000-1234) already exists.";
        let result =
            ConstraintParser::parse_unique_violation(message, Some("orders_order_number_key"));
        assert_eq!(
            result,
            Some((
                "orders".to_string(),
                "order_number".to_string(),
                "ORD-260101-120000-1234".to_string()
            ))
        );
    }

    #[test]
    fn test_unique_violation_without_detail() {
        let result = ConstraintParser::parse_unique_violation("duplicate", Some("users_email_key"));
        assert_eq!(
            result,
            Some((
                "users".to_string(),
                "email".to_string(),
                "duplicate_value".to_string()
            ))
        );
    }

    #[test]
    fn test_unique_violation_from_message_only() {
        let message = "duplicate key value violates unique constraint on table \"products\"\nDETAIL: Key (name)=(Lamp) already exists.";
        let result = ConstraintParser::parse_unique_violation(message, None);
        assert_eq!(
            result,
            Some(("products".to_string(), "name".to_string(), "Lamp".to_string()))
        );
    }

    #[test]
    fn test_foreign_key_violation_on_order_items() {
        let message = "insert or update on table \"order_items\" violates foreign key constraint \"order_items_product_id_fkey\"\nDETAIL: Key (product_id)=(999) is not present in table \"products\".";
        let result = ConstraintParser::parse_foreign_key_violation(
            message,
            Some("order_items_product_id_fkey"),
        );
        assert_eq!(
            result,
            Some((
                "order_items".to_string(),
                "product_id".to_string(),
                "999".to_string()
            ))
        );
    }

    #[test]
    fn test_not_null_violation() {
        let message = "null value in column \"phone\" of relation \"orders\" violates not-null constraint";
        let result = ConstraintParser::parse_not_null_violation(message, None);
        assert_eq!(result, Some(("orders".to_string(), "phone".to_string())));
    }

    #[test]
    fn test_check_violation() {
        let result = ConstraintParser::parse_check_violation(
            "new row for relation \"order_items\" violates check constraint",
            Some("order_items_qty_check"),
        );
        assert_eq!(result, Some(("order_items".to_string(), "qty".to_string())));
    }

    #[test]
    fn test_check_violation_from_message_only() {
        let message = "new row for relation \"orders\" violates check constraint \"orders_total_amount_check\"";
        let result = ConstraintParser::parse_check_violation(message, None);
        assert_eq!(result, Some(("orders".to_string(), "total_amount".to_string())));
    }

    #[test]
    fn test_unparseable_messages() {
        assert_eq!(ConstraintParser::parse_unique_violation("boom", None), None);
        assert_eq!(ConstraintParser::parse_foreign_key_violation("boom", Some("weird")), None);
        assert_eq!(ConstraintParser::parse_check_violation("boom", None), None);
    }
}
