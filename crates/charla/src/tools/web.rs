//! Web browsing tool: fetch a page as raw HTML, readable text, or a link
//! inventory.

use crate::tools::core::{Tool, ToolFuture};
use crate::{ToolDef, json_schema_for};
use schemars::JsonSchema;
use scraper::{Html, Node, Selector};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::info;

/// Typed arguments for `browse_website`.
#[derive(Deserialize, JsonSchema)]
pub struct BrowseWebsiteArgs {
    /// The URL to fetch. Any valid http(s) URL.
    pub url: String,
    /// One of "html", "human", "links".
    pub mode: String,
}

/// HTTP GET a web page and render it for the model.
///
/// Modes:
/// - `html`: the raw response body.
/// - `human`: only the visible text of the page.
/// - `links`: a sorted, deduplicated list of every `href` on the page.
pub struct BrowseWebsite {
    client: reqwest::Client,
}

impl BrowseWebsite {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent("charla/0.3")
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }
}

impl Tool for BrowseWebsite {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            "browse_website",
            "Fetches any webpage on the internet with an HTTP GET. Mode \"human\" \
             returns only the readable text of the page; mode \"links\" returns every \
             link on the page and is the best way to explore a website first; mode \
             \"html\" returns the raw HTML. For browsing, use a multi-step strategy: \
             call with \"links\" first, then call again with \"human\" on the pages \
             you need. To search, start from \
             'https://es.wikipedia.org/w/index.php?search=<search_term>'.",
            json_schema_for::<BrowseWebsiteArgs>(),
        )
    }

    fn invoke(&self, arguments: &serde_json::Value) -> ToolFuture<'_> {
        let arguments = arguments.clone();
        Box::pin(async move {
            let args: BrowseWebsiteArgs =
                serde_json::from_value(arguments).map_err(|e| format!("Error: {e}"))?;

            info!("fetching {} ({} mode)", args.url, args.mode);
            let response = self
                .client
                .get(&args.url)
                .send()
                .await
                .map_err(|e| format!("Error, cannot fetch {}: {e}", args.url))?;
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|e| format!("Error, cannot read body of {}: {e}", args.url))?;

            let rendered = match args.mode.as_str() {
                "html" => format!("[{status}] {body}"),
                "human" => format!("[{status}] {}", page_text(&body)),
                "links" => format!("[{status}] {}", page_links(&body).join(", ")),
                other => {
                    return Err(format!(
                        "Error, unknown mode '{other}' (pick one of: html, human, links)"
                    ));
                }
            };
            Ok(remove_empty_lines(&rendered))
        })
    }
}

/// Visible text of the page, skipping script and style contents.
fn page_text(body: &str) -> String {
    let document = Html::parse_document(body);
    let mut out = String::new();
    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| match a.value() {
            Node::Element(el) => matches!(el.name(), "script" | "style"),
            _ => false,
        });
        if !hidden {
            out.push_str(&text.text);
        }
    }
    out
}

/// Sorted, deduplicated href targets.
fn page_links(body: &str) -> Vec<String> {
    let document = Html::parse_document(body);
    let Ok(anchors) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let links: BTreeSet<String> = document
        .select(&anchors)
        .filter_map(|a| a.value().attr("href"))
        .map(str::to_string)
        .collect();
    links.into_iter().collect()
}

fn remove_empty_lines(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
