//! HTML to plain text.
//!
//! Parsed with a lenient `quick-xml` reader (unmatched and unclosed tags
//! allowed). Markup the reader cannot cope with at all, such as an inline
//! script containing `<`, falls back to a character-level tag stripper.
//! Both paths drop `<script>`/`<style>` content, turn block elements into
//! line breaks and decode common entities.

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

/// Elements that start a new line.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "figcaption",
    "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav",
    "ol", "p", "pre", "section", "table", "td", "th", "title", "tr", "ul",
];

/// Elements whose content is never text.
const SKIP_TAGS: &[&str] = &["script", "style", "noscript", "template", "head"];

fn tag_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).to_ascii_lowercase()
}

/// Extract readable text from an HTML document.
pub fn extract_html(html: &str) -> String {
    match parse_lenient(html) {
        Ok(text) => normalize(&text),
        Err(e) => {
            debug!(error = %e, "html parse failed, stripping tags");
            normalize(&strip_tags(html))
        }
    }
}

fn parse_lenient(html: &str) -> Result<String, quick_xml::Error> {
    let mut reader = Reader::from_str(html);
    {
        let cfg = reader.config_mut();
        cfg.check_end_names = false;
        cfg.allow_unmatched_ends = true;
        cfg.check_comments = false;
    }

    let mut out = String::new();
    let mut skip_depth = 0usize;
    // <title> lives inside <head>, which is skipped; keep it anyway.
    let mut in_title = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = tag_name(e.local_name().as_ref());
                if name == "title" {
                    in_title = true;
                } else if SKIP_TAGS.contains(&name.as_str()) {
                    skip_depth += 1;
                }
                if BLOCK_TAGS.contains(&name.as_str()) {
                    out.push('\n');
                }
            }
            Event::Empty(e) => {
                let name = tag_name(e.local_name().as_ref());
                if BLOCK_TAGS.contains(&name.as_str()) {
                    out.push('\n');
                }
            }
            Event::End(e) => {
                let name = tag_name(e.local_name().as_ref());
                if name == "title" {
                    in_title = false;
                } else if SKIP_TAGS.contains(&name.as_str()) {
                    skip_depth = skip_depth.saturating_sub(1);
                }
                if BLOCK_TAGS.contains(&name.as_str()) {
                    out.push('\n');
                }
            }
            Event::Text(te) if skip_depth == 0 || in_title => {
                out.push_str(&decode_entities(&String::from_utf8_lossy(&te)));
            }
            Event::CData(cd) if skip_depth == 0 => {
                out.push_str(&String::from_utf8_lossy(&cd));
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

/// Character-level fallback: drop everything between `<` and `>`.
fn strip_tags(html: &str) -> String {
    let mut out = String::new();
    let mut rest = html;

    while let Some(open) = rest.find('<') {
        out.push_str(&decode_entities(&rest[..open]));
        let after = &rest[open + 1..];
        let Some(close) = after.find('>') else {
            rest = "";
            break;
        };
        let tag = &after[..close];
        let name = tag_name(
            tag.trim_start_matches('/')
                .split(|c: char| c.is_whitespace() || c == '/')
                .next()
                .unwrap_or("")
                .as_bytes(),
        );
        rest = &after[close + 1..];

        if !tag.starts_with('/') && SKIP_TAGS.contains(&name.as_str()) && name != "head" {
            // Jump past the matching close tag.
            let closing = format!("</{name}");
            match rest.to_ascii_lowercase().find(&closing) {
                Some(pos) => {
                    let tail = &rest[pos..];
                    rest = tail.find('>').map(|i| &tail[i + 1..]).unwrap_or("");
                }
                None => rest = "",
            }
            continue;
        }
        if BLOCK_TAGS.contains(&name.as_str()) {
            out.push('\n');
        }
    }
    out.push_str(&decode_entities(rest));
    out
}

/// Decode named and numeric character references. Unknown ones are kept
/// verbatim.
pub fn decode_entities(s: &str) -> String {
    if !s.contains('&') {
        return s.to_string();
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail[1..]
            .find(';')
            .filter(|&end| end > 0 && end <= 10)
            .and_then(|end| resolve_entity(&tail[1..=end]).map(|c| (c, end + 2)));
        match decoded {
            Some((c, consumed)) => {
                out.push(c);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn resolve_entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code);
    }
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "ndash" => '–',
        "mdash" => '—',
        "hellip" => '…',
        "lsquo" => '‘',
        "rsquo" => '’',
        "ldquo" => '“',
        "rdquo" => '”',
        "laquo" => '«',
        "raquo" => '»',
        "bull" => '•',
        "middot" => '·',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        "deg" => '°',
        "euro" => '€',
        _ => return None,
    };
    Some(c)
}

/// Collapse whitespace within lines and drop blank-line runs.
fn normalize(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut blank = false;
    for line in text.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            if !lines.is_empty() {
                blank = true;
            }
            continue;
        }
        if blank {
            lines.push(String::new());
            blank = false;
        }
        lines.push(collapsed);
    }
    lines.join("\n")
}
