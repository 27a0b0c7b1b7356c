use crate::CrawlError;
use scraper::{Html, Selector};
use url::Url;

pub fn normalize_url(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.to_string().trim_end_matches('/').to_string()
}

// e.g. `download?file=report.pdf` counts too
pub fn is_pdf_candidate(url: &Url) -> bool {
    if url.path().to_ascii_lowercase().ends_with(".pdf") {
        return true;
    }
    let mut without_fragment = url.clone();
    without_fragment.set_fragment(None);
    without_fragment.as_str().to_ascii_lowercase().contains(".pdf")
}

pub fn pdf_name(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|segment| !segment.is_empty()).last())
        .unwrap_or("document");

    if segment.to_ascii_lowercase().ends_with(".pdf") {
        segment.to_string()
    } else {
        format!("{segment}.pdf")
    }
}

pub fn same_domain(candidate: &Url, seed: &Url) -> bool {
    match (candidate.host_str(), seed.host_str()) {
        (Some(left), Some(right)) => left.eq_ignore_ascii_case(right),
        _ => false,
    }
}

/// Absolute http(s) links of every `<a href>` in the page, in document order.
pub fn extract_links(html: &str, base: &Url) -> Result<Vec<Url>, CrawlError> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]")
        .map_err(|error| CrawlError::ParseError(format!("invalid selector: {error:?}")))?;

    let mut links = Vec::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("javascript:")
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
        {
            continue;
        }

        if let Ok(absolute) = base.join(href) {
            if absolute.scheme() == "http" || absolute.scheme() == "https" {
                links.push(absolute);
            }
        }
    }

    Ok(links)
}
