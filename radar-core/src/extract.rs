//! Attribute extraction from free text
//!
//! Recognizes, in Dutch and English phrasing:
//! - Registry numbers (`KvK: 12345678`), legal form and no-registration remarks
//! - Contact channels: phone, email, website, social handles
//! - Founding year, years of experience and team size
//! - Star ratings and review counts
//! - Freelancer keywords, locality and specializations

use regex::Regex;
use std::sync::LazyLock;

use crate::{attr, AttrValue, ExtractedAttributes};

static REGISTRY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bkvk(?:[-\s]?(?:nummer|nr\.?|number))?\s*[:#]?\s*(\d{8})\b").unwrap()
});

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap()
});

static PHONE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:(?:\+|\b00)31[\s-]?(?:\(0\)[\s-]?)?|\b0)\d(?:[\s-]?\d){8}\b").unwrap()
});

static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:https?://[^\s<>"']+|www\.[a-z0-9-]+(?:\.[a-z0-9-]+)+(?:/[^\s<>"']*)?)"#)
        .unwrap()
});

static SOCIAL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(?:^|[\s(])@([A-Za-z0-9_][A-Za-z0-9_.]{1,29})").unwrap()
});

static FOUNDED_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:opgericht|sinds|founded|established|since)\s*(?:in\s*)?:?\s*((?:19|20)\d{2})\b")
        .unwrap()
});

static EXPERIENCE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})\+?\s*(?:jaar|years?)\s+(?:of\s+)?(?:ervaring|experience)\b").unwrap()
});

static EMPLOYEES_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,5})\s*(?:medewerkers|werknemers|employees|mensen in dienst)\b").unwrap()
});

static RATING_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:[★☆]+\s*\((\d(?:[.,]\d{1,2})?)\))|(?:\b(\d(?:[.,]\d{1,2})?)\s*/\s*5\b)|(?i:(?:rating|beoordeling)\s*:?\s*(\d(?:[.,]\d{1,2})?))",
    )
    .unwrap()
});

static REVIEWS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d{1,6})\s*(?:reviews?|beoordelingen|recensies)\b").unwrap()
});

static FREELANCER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:zzp(?:'?er)?|freelancer?|zelfstandige|zelfstandig ondernemer|eenmanszaak|self-employed)\b")
        .unwrap()
});

static NO_REGISTRATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:(?:geen|zonder)\s+(?:kvk|inschrijving)|not registered|unregistered)\b").unwrap()
});

static LEGAL_FORM_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(b\.v\.|bv|v\.o\.f\.|vof|n\.v\.|eenmanszaak)(?:\s|$|,)").unwrap()
});

static LOCALITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i:\b(?:regio|gevestigd in|based in|located in|werkgebied|plaats|locatie))\s*:?\s*(\p{Lu}[\p{L}'-]+(?:[ -]\p{Lu}[\p{L}'-]+)?)",
    )
    .unwrap()
});

static POSTCODE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{4}\s?[A-Z]{2}\s+(\p{Lu}[\p{L}'-]+)").unwrap()
});

static SPECIALIZATIONS_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:specialisaties|specialisatie|specialties|specialisms|diensten|services)\s*:\s*(.+)$")
        .unwrap()
});

static LIST_SPLIT_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s*(?:,|/|&|;|\ben\b|\band\b)\s*").unwrap()
});

/// Extract every recognizable attribute from free text.
///
/// Only attributes actually found are present in the result.
pub fn extract_attributes(text: &str) -> ExtractedAttributes {
    let mut attrs = ExtractedAttributes::new();

    if let Some(name) = extract_name(text) {
        attrs.insert(attr::NAME.into(), name.into());
    }

    let registry_id = REGISTRY_REGEX
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    if let Some(id) = &registry_id {
        attrs.insert(attr::REGISTRY_ID.into(), id.as_str().into());
    }

    if let Some(m) = EMAIL_REGEX.find(text) {
        attrs.insert(attr::EMAIL.into(), m.as_str().to_lowercase().into());
    }

    if let Some(m) = PHONE_REGEX.find(text) {
        attrs.insert(attr::PHONE.into(), m.as_str().to_string().into());
    }

    if let Some(m) = URL_REGEX.find(text) {
        let url = m.as_str().trim_end_matches(['.', ',', ')', ';']);
        attrs.insert(attr::WEBSITE.into(), url.into());
    }

    let handles: Vec<String> = SOCIAL_REGEX
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim_end_matches('.').to_lowercase())
        .fold(Vec::new(), |mut acc, h| {
            if !acc.contains(&h) {
                acc.push(h);
            }
            acc
        });
    if !handles.is_empty() {
        attrs.insert(attr::SOCIAL_HANDLES.into(), AttrValue::List(handles));
    }

    if let Some(year) = capture_number(&FOUNDED_REGEX, text) {
        attrs.insert(attr::FOUNDED_YEAR.into(), year.into());
    }

    if let Some(years) = capture_number(&EXPERIENCE_REGEX, text) {
        attrs.insert(attr::YEARS_IN_BUSINESS.into(), years.into());
    }

    if let Some(count) = capture_number(&EMPLOYEES_REGEX, text) {
        attrs.insert(attr::EMPLOYEE_COUNT.into(), count.into());
    }

    if let Some(rating) = extract_rating(text) {
        attrs.insert(attr::RATING.into(), rating.into());
    }

    if let Some(count) = capture_number(&REVIEWS_REGEX, text) {
        attrs.insert(attr::REVIEW_COUNT.into(), count.into());
    }

    if FREELANCER_REGEX.is_match(text) {
        attrs.insert(attr::FREELANCER.into(), true.into());
    }

    let legal_form = LEGAL_FORM_REGEX
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().replace('.', "").to_lowercase());
    if let Some(form) = &legal_form {
        attrs.insert(attr::LEGAL_FORM.into(), form.as_str().into());
    }

    if NO_REGISTRATION_REGEX.is_match(text) {
        attrs.insert(attr::REGISTERED.into(), false.into());
    } else if registry_id.is_some() || legal_form.is_some() {
        attrs.insert(attr::REGISTERED.into(), true.into());
    }

    if let Some(locality) = extract_locality(text) {
        attrs.insert(attr::LOCALITY.into(), locality.into());
    }

    let specializations = extract_specializations(text);
    if !specializations.is_empty() {
        attrs.insert(attr::SPECIALIZATIONS.into(), AttrValue::List(specializations));
    }

    attrs
}

fn capture_number(re: &Regex, text: &str) -> Option<f64> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
}

fn extract_rating(text: &str) -> Option<f64> {
    RATING_REGEX.captures_iter(text).find_map(|caps| {
        let raw = caps.iter().skip(1).flatten().next()?;
        let value: f64 = raw.as_str().replace(',', ".").parse().ok()?;
        (0.0..=5.0).contains(&value).then_some(value)
    })
}

/// First short line that reads like a business name
fn extract_name(text: &str) -> Option<String> {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty())?;
    let lower = line.to_lowercase();
    let looks_like_name = line.chars().count() <= 80
        && !line.contains(':')
        && !lower.starts_with("http")
        && !lower.starts_with("www.")
        && line.chars().any(char::is_alphabetic)
        && !line.ends_with('.');
    looks_like_name.then(|| line.to_string())
}

fn extract_locality(text: &str) -> Option<String> {
    LOCALITY_REGEX
        .captures(text)
        .or_else(|| POSTCODE_REGEX.captures(text))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
}

fn extract_specializations(text: &str) -> Vec<String> {
    let Some(line) = SPECIALIZATIONS_REGEX
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
    else {
        return Vec::new();
    };

    let mut items: Vec<String> = Vec::new();
    for item in LIST_SPLIT_REGEX.split(line) {
        let item = item.trim().trim_end_matches('.').to_lowercase();
        if !item.is_empty() && !items.contains(&item) {
            items.push(item);
        }
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    const ESTABLISHED: &str = "Van der Berg Loodgieters BV
KvK: 12345678
Opgericht: 2015
Specialisaties: Loodgieter, CV-installateur
5 medewerkers
★★★★☆ (4.5) - 127 reviews
Gevestigd in Amersfoort
www.vanderbergloodgieters.nl
meer dan 8 jaar ervaring";

    const FREELANCER: &str = "Mike's Klusbedrijf
ZZP'er sinds 2022 | Regio Utrecht
Volg mij op Instagram @mikesklussen
Tel: 06-12345678
4.8/5 op basis van 23 reviews";

    const HOBBYIST: &str = "Klusjes gezocht!
Ik help graag in de buurt met kleine klussen, geen KvK.
Bijverdienste naast mijn baan. Mail: piet.klus@gmail.com";

    #[test]
    fn test_established_business() {
        let attrs = extract_attributes(ESTABLISHED);
        assert_eq!(attrs[attr::NAME], AttrValue::from("Van der Berg Loodgieters BV"));
        assert_eq!(attrs[attr::REGISTRY_ID], AttrValue::from("12345678"));
        assert_eq!(attrs[attr::FOUNDED_YEAR], AttrValue::Number(2015.0));
        assert_eq!(attrs[attr::EMPLOYEE_COUNT], AttrValue::Number(5.0));
        assert_eq!(attrs[attr::RATING], AttrValue::Number(4.5));
        assert_eq!(attrs[attr::REVIEW_COUNT], AttrValue::Number(127.0));
        assert_eq!(attrs[attr::YEARS_IN_BUSINESS], AttrValue::Number(8.0));
        assert_eq!(attrs[attr::REGISTERED], AttrValue::Flag(true));
        assert_eq!(attrs[attr::LEGAL_FORM], AttrValue::from("bv"));
        assert_eq!(attrs[attr::LOCALITY], AttrValue::from("Amersfoort"));
        assert_eq!(
            attrs[attr::WEBSITE],
            AttrValue::from("www.vanderbergloodgieters.nl")
        );
        assert_eq!(
            attrs[attr::SPECIALIZATIONS],
            AttrValue::List(vec!["loodgieter".into(), "cv-installateur".into()])
        );
        assert!(!attrs.contains_key(attr::FREELANCER));
    }

    #[test]
    fn test_freelancer() {
        let attrs = extract_attributes(FREELANCER);
        assert_eq!(attrs[attr::FREELANCER], AttrValue::Flag(true));
        assert_eq!(attrs[attr::FOUNDED_YEAR], AttrValue::Number(2022.0));
        assert_eq!(attrs[attr::RATING], AttrValue::Number(4.8));
        assert_eq!(attrs[attr::REVIEW_COUNT], AttrValue::Number(23.0));
        assert_eq!(attrs[attr::LOCALITY], AttrValue::from("Utrecht"));
        assert_eq!(attrs[attr::PHONE], AttrValue::from("06-12345678"));
        assert_eq!(
            attrs[attr::SOCIAL_HANDLES],
            AttrValue::List(vec!["mikesklussen".into()])
        );
        assert!(!attrs.contains_key(attr::REGISTERED));
    }

    #[test]
    fn test_hobbyist_without_registration() {
        let attrs = extract_attributes(HOBBYIST);
        assert_eq!(attrs[attr::REGISTERED], AttrValue::Flag(false));
        assert_eq!(attrs[attr::EMAIL], AttrValue::from("piet.klus@gmail.com"));
        assert!(!attrs.contains_key(attr::REGISTRY_ID));
        assert!(!attrs.contains_key(attr::SOCIAL_HANDLES));
        assert!(!attrs.contains_key(attr::STAFF_MEMBER));
    }

    #[test]
    fn test_out_of_range_rating_ignored() {
        let attrs = extract_attributes("Beoordeling: 8");
        assert!(!attrs.contains_key(attr::RATING));
    }

    #[test]
    fn test_empty_text() {
        assert!(extract_attributes("").is_empty());
    }
}
