//! Impure news tools.
//!
//! Unlike the emitters these reach the network: a Google News RSS search
//! and a per-symbol headline fetch. Both return a plain text blob for the
//! model to read. Failures surface as tool errors, which the loop absorbs
//! into the transcript.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use super::{arg_str, ParamKind, ToolDef, ToolParam};

const FETCH_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_HEADLINES: usize = 10;

/// `search_google_news(query)`: free-form news search.
pub fn search_google_news(http: reqwest::Client) -> ToolDef {
    ToolDef::asynchronous(
        "search_google_news",
        "Search Google News for recent articles matching a query and return the headlines.",
        vec![ToolParam::required(
            "query",
            ParamKind::String,
            "Search query",
        )],
        move |args| {
            let http = http.clone();
            async move {
                let query = arg_str(&args, "query");
                if query.is_empty() {
                    return Err("query must not be empty".to_string());
                }
                fetch_headlines(&http, &query).await
            }
        },
    )
}

/// `fetch_stock_news(symbol)`: recent headlines for one ticker.
pub fn fetch_stock_news(http: reqwest::Client) -> ToolDef {
    ToolDef::asynchronous(
        "fetch_stock_news",
        "Fetch recent news headlines for a stock symbol.",
        vec![ToolParam::required(
            "symbol",
            ParamKind::String,
            "Stock ticker symbol",
        )],
        move |args| {
            let http = http.clone();
            async move {
                let symbol = arg_str(&args, "symbol");
                if symbol.is_empty() {
                    return Err("symbol must not be empty".to_string());
                }
                let query = format!("{symbol} stock");
                fetch_headlines(&http, &query).await
            }
        },
    )
}

async fn fetch_headlines(http: &reqwest::Client, query: &str) -> Result<Value, String> {
    let url = format!(
        "https://news.google.com/rss/search?q={}&hl=en-US&gl=US&ceid=US:en",
        urlencode(query)
    );
    debug!(query, "fetching news feed");
    let body = http
        .get(&url)
        .timeout(FETCH_TIMEOUT)
        .send()
        .await
        .map_err(|e| format!("news fetch failed: {e}"))?
        .error_for_status()
        .map_err(|e| format!("news fetch failed: {e}"))?
        .text()
        .await
        .map_err(|e| format!("news fetch failed: {e}"))?;

    let headlines = extract_items(&body);
    if headlines.is_empty() {
        return Ok(Value::String(format!("No recent news found for \"{query}\".")));
    }
    let mut blob = format!("Recent news for \"{query}\":\n");
    for (i, (title, date)) in headlines.iter().enumerate() {
        if date.is_empty() {
            blob.push_str(&format!("{}. {}\n", i + 1, title));
        } else {
            blob.push_str(&format!("{}. {} ({})\n", i + 1, title, date));
        }
    }
    Ok(Value::String(blob))
}

/// Pull `(title, pubDate)` pairs out of an RSS payload. The feed shape is
/// simple enough that a scan for the item tags is all that is needed.
fn extract_items(body: &str) -> Vec<(String, String)> {
    let mut items = Vec::new();
    for item in body.split("<item>").skip(1).take(MAX_HEADLINES) {
        let title = tag_content(item, "title");
        if title.is_empty() {
            continue;
        }
        items.push((title, tag_content(item, "pubDate")));
    }
    items
}

fn tag_content(chunk: &str, tag: &str) -> String {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let Some(start) = chunk.find(&open) else {
        return String::new();
    };
    let rest = &chunk[start + open.len()..];
    let Some(end) = rest.find(&close) else {
        return String::new();
    };
    let raw = rest[..end].trim();
    raw.strip_prefix("<![CDATA[")
        .and_then(|s| s.strip_suffix("]]>"))
        .unwrap_or(raw)
        .to_string()
}

fn urlencode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            b' ' => out.push('+'),
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_are_extracted_from_rss() {
        let body = r#"<rss><channel>
            <title>feed title</title>
            <item><title>First headline</title><pubDate>Mon, 01 Jan 2026</pubDate></item>
            <item><title><![CDATA[Second & headline]]></title></item>
        </channel></rss>"#;
        let items = extract_items(body);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].0, "First headline");
        assert_eq!(items[0].1, "Mon, 01 Jan 2026");
        assert_eq!(items[1].0, "Second & headline");
        assert_eq!(items[1].1, "");
    }

    #[test]
    fn channel_title_is_not_an_item() {
        let items = extract_items("<title>only channel</title>");
        assert!(items.is_empty());
    }

    #[test]
    fn query_encoding() {
        assert_eq!(urlencode("AAPL stock"), "AAPL+stock");
        assert_eq!(urlencode("a&b"), "a%26b");
    }
}
