//! Field normalization shared by the HTML and JSON parsers

use url::Url;

/// Year, make and model pulled out of a listing title
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TitleParts {
    /// Model year
    pub year: Option<u16>,
    /// Manufacturer
    pub make: Option<String>,
    /// Model and trim
    pub model: Option<String>,
}

/// Split a `YEAR MAKE MODEL...` title.
///
/// Titles that do not start with a four digit year yield no parts, since
/// any split of them would be a guess. A leading condition word such as
/// "Used" or "Certified" is skipped.
pub fn parse_title(title: &str) -> TitleParts {
    let mut tokens = title
        .split_whitespace()
        .skip_while(|t| matches!(t.to_lowercase().as_str(), "new" | "used" | "certified" | "cpo"))
        .peekable();

    let year = match tokens.peek() {
        Some(token) if token.len() == 4 && token.chars().all(|c| c.is_ascii_digit()) => {
            token.parse::<u16>().ok()
        }
        _ => None,
    };
    if year.is_none() {
        return TitleParts::default();
    }
    tokens.next();

    let make = tokens.next().map(str::to_string);
    let model = {
        let rest: Vec<&str> = tokens.collect();
        (!rest.is_empty()).then(|| rest.join(" "))
    };

    TitleParts { year, make, model }
}

/// Parse a whole number out of locale formatted text.
///
/// Keeps the digits of the integer part only: `"$23,995"` is 23995,
/// `"41,210 mi."` is 41210, `"$1,234.56"` is 1234. Text without digits
/// (`"Not Priced"`) yields `None`.
pub fn clean_number(text: &str) -> Option<u64> {
    let integer_part = match text.find('.') {
        Some(idx) if text[idx + 1..].starts_with(|c: char| c.is_ascii_digit()) => &text[..idx],
        _ => text,
    };

    let digits: String = integer_part.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}

/// Collapse internal whitespace and trim; empty text becomes `None`.
pub fn clean_text(text: &str) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

/// Dealer location without the trailing distance, e.g. `"Chicago, IL (12 mi.)"`.
pub fn clean_location(text: &str) -> Option<String> {
    let without_distance = match text.find('(') {
        Some(idx) => &text[..idx],
        None => text,
    };
    clean_text(without_distance)
}

/// Resolve `href` against the page URL. Absolute links pass through.
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }

    match Url::parse(href) {
        Ok(absolute) => Some(absolute.to_string()),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(base)
            .and_then(|base| base.join(href))
            .ok()
            .map(|u| u.to_string()),
        Err(_) => None,
    }
}

/// Upgrade a thumbnail URL to the medium-sized variant.
pub fn upgrade_image(url: &str) -> String {
    url.replace("/small/", "/medium/")
}
