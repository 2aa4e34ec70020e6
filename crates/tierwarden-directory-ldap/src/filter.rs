//! RFC 4515 filter rendering.

use tierwarden_directory::Filter;

/// Render a filter as LDAP filter text.
pub fn filter_to_ldap(filter: &Filter) -> String {
    match filter {
        Filter::And { filters } => {
            let inner: Vec<String> = filters.iter().map(filter_to_ldap).collect();
            format!("(&{})", inner.join(""))
        }
        Filter::Or { filters } => {
            let inner: Vec<String> = filters.iter().map(filter_to_ldap).collect();
            format!("(|{})", inner.join(""))
        }
        Filter::Not { filter } => format!("(!{})", filter_to_ldap(filter)),
        Filter::Equals { attribute, value } => {
            format!("({}={})", attribute, escape_filter_value(value))
        }
        Filter::Contains { attribute, value } => {
            format!("({}=*{}*)", attribute, escape_filter_value(value))
        }
        Filter::StartsWith { attribute, value } => {
            format!("({}={}*)", attribute, escape_filter_value(value))
        }
        Filter::EndsWith { attribute, value } => {
            format!("({}=*{})", attribute, escape_filter_value(value))
        }
        Filter::GreaterThanOrEquals { attribute, value } => {
            format!("({}>={})", attribute, escape_filter_value(value))
        }
        Filter::LessThanOrEquals { attribute, value } => {
            format!("({}<={})", attribute, escape_filter_value(value))
        }
        Filter::Present { attribute } => format!("({attribute}=*)"),
    }
}

/// Escape special characters in filter values.
pub fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\5c")
        .replace('*', "\\2a")
        .replace('(', "\\28")
        .replace(')', "\\29")
        .replace('\0', "\\00")
}
