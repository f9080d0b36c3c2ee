//! `Link`-header pagination
//!
//! List endpoints return one page per response and point at the next one with
//! `Link: <url>; rel="next"`. [`collect_all`] follows those links in order
//! until a response has no `next` relation.

use std::collections::HashSet;
use std::future::Future;

use reqwest::Response;
use reqwest::header::LINK;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::client::{Client, Query};
use crate::error::{ApiError, Result};

/// Relations parsed from a `Link` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLinks {
    pub next: Option<String>,
    pub prev: Option<String>,
    pub first: Option<String>,
    pub last: Option<String>,
}

impl PageLinks {
    pub fn from_response(response: &Response) -> Self {
        response
            .headers()
            .get(LINK)
            .and_then(|value| value.to_str().ok())
            .map(parse_link_header)
            .unwrap_or_default()
    }
}

/// Parse `<url>; rel="name"` segments separated by commas.
///
/// Segments without a `;` or with an unknown relation are skipped, so a
/// malformed header yields no links rather than an error.
pub fn parse_link_header(header: &str) -> PageLinks {
    let mut links = PageLinks::default();

    for part in header.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let Some((target, params)) = part.split_once(';') else {
            continue;
        };
        let target = target.trim();
        let target = target.strip_prefix('<').unwrap_or(target);
        let target = target.strip_suffix('>').unwrap_or(target).to_string();

        let rel = params.trim();
        let rel = rel.strip_prefix("rel=").unwrap_or(rel).trim_matches('"');

        match rel {
            "next" => links.next = Some(target),
            "prev" => links.prev = Some(target),
            "first" => links.first = Some(target),
            "last" => links.last = Some(target),
            _ => {}
        }
    }

    links
}

/// GET `path` and every following page, decoding each with `decode`.
///
/// The `Link` header is read before the response is handed to `decode`.
/// Pages are fetched one at a time and items keep their server order.
/// A `next` link back to any page already fetched ends the walk.
pub async fn collect_all<T, F, Fut>(
    client: &Client,
    path: &str,
    query: &[(String, String)],
    mut decode: F,
) -> Result<Vec<T>>
where
    F: FnMut(Response) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let mut items = Vec::new();
    let mut path = path.trim_start_matches('/').to_string();
    let mut query: Query = query.to_vec();
    let mut pages = 0usize;
    let mut visited: HashSet<(String, Query)> = HashSet::new();
    visited.insert((path.clone(), query.clone()));

    loop {
        let response = client.get(&path, &query).await?;
        let links = PageLinks::from_response(&response);

        let page = decode(response).await?;
        pages += 1;
        debug!(page = pages, items = page.len(), path = %path, "fetched page");
        items.extend(page);

        let Some(next) = links.next else {
            break;
        };
        let next_url = client
            .root()
            .join(&next)
            .map_err(|e| ApiError::InvalidRequest(format!("invalid next link {next:?}: {e}")))?;
        let (next_path, next_query) = client.relative_path(&next_url)?;

        if !visited.insert((next_path.clone(), next_query.clone())) {
            warn!(link = %next_url, pages, "next link points at a page already fetched, stopping");
            break;
        }
        path = next_path;
        query = next_query;
    }

    Ok(items)
}

/// [`collect_all`] for endpoints whose pages are JSON arrays of `T`.
pub async fn collect_all_json<T: DeserializeOwned>(
    client: &Client,
    path: &str,
    query: &[(String, String)],
) -> Result<Vec<T>> {
    collect_all(client, path, query, Client::decode::<Vec<T>>).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backoff::RetryPolicy;
    use serde::Deserialize;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: u32,
    }

    fn client(server: &MockServer) -> Client {
        Client::builder("12345", "tok")
            .base_url(server.uri())
            .retry_policy(RetryPolicy {
                base_delay: Duration::from_millis(1),
                ..RetryPolicy::default()
            })
            .build()
            .unwrap()
    }

    #[test]
    fn parses_single_next() {
        let links =
            parse_link_header(r#"<https://api.example.com/v1/123/products?page=2>; rel="next""#);
        assert_eq!(
            links.next.as_deref(),
            Some("https://api.example.com/v1/123/products?page=2")
        );
        assert_eq!(links.prev, None);
    }

    #[test]
    fn parses_all_relations() {
        let links = parse_link_header(
            r#"<http://a.com?page=2>; rel="next", <http://a.com?page=1>; rel="prev", <http://a.com?page=1>; rel="first", <http://a.com?page=5>; rel="last""#,
        );
        assert_eq!(
            links,
            PageLinks {
                next: Some("http://a.com?page=2".into()),
                prev: Some("http://a.com?page=1".into()),
                first: Some("http://a.com?page=1".into()),
                last: Some("http://a.com?page=5".into()),
            }
        );
    }

    #[test]
    fn tolerates_whitespace() {
        let links = parse_link_header(r#"  <http://a.com?page=2> ; rel="next"  "#);
        assert_eq!(links.next.as_deref(), Some("http://a.com?page=2"));
    }

    #[test]
    fn malformed_or_empty_headers_have_no_links() {
        assert_eq!(parse_link_header(""), PageLinks::default());
        assert_eq!(parse_link_header("not a link header"), PageLinks::default());
        assert_eq!(
            parse_link_header(r#"<http://a.com>; rel="canonical""#),
            PageLinks::default()
        );
    }

    #[tokio::test]
    async fn follows_next_links_in_order() {
        let server = MockServer::start().await;
        let base = server.uri();

        Mock::given(method("GET"))
            .and(path("/12345/products"))
            .and(query_param_is_missing("page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("link", format!(r#"<{base}/12345/products?page=2>; rel="next""#).as_str())
                    .set_body_string(r#"[{"id":1},{"id":2}]"#),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/12345/products"))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header(
                        "link",
                        format!(
                            r#"<{base}/12345/products?page=3>; rel="next", <{base}/12345/products?page=1>; rel="prev""#
                        )
                        .as_str(),
                    )
                    .set_body_string(r#"[{"id":3}]"#),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/12345/products"))
            .and(query_param("page", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"[{"id":4}]"#))
            .expect(1)
            .mount(&server)
            .await;

        let items: Vec<Item> = collect_all_json(&client(&server), "/products", &[])
            .await
            .unwrap();
        assert_eq!(
            items,
            vec![Item { id: 1 }, Item { id: 2 }, Item { id: 3 }, Item { id: 4 }]
        );
    }

    #[tokio::test]
    async fn single_page_without_link_makes_one_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/12345/orders"))
            .and(query_param("status", "open"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"[{"id":9}]"#))
            .expect(1)
            .mount(&server)
            .await;

        let items: Vec<Item> =
            collect_all_json(&client(&server), "orders", &[("status".into(), "open".into())])
                .await
                .unwrap();
        assert_eq!(items, vec![Item { id: 9 }]);
    }

    #[tokio::test]
    async fn custom_decoder_sees_every_page() {
        let server = MockServer::start().await;
        let base = server.uri();
        Mock::given(method("GET"))
            .and(query_param_is_missing("page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("link", format!(r#"<{base}/12345/categories?page=2>; rel="next""#).as_str())
                    .set_body_string(r#"{"results":[{"id":1}]}"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"results":[{"id":2}]}"#))
            .mount(&server)
            .await;

        #[derive(Deserialize)]
        struct Envelope {
            results: Vec<Item>,
        }

        let mut calls = 0;
        let items = collect_all(&client(&server), "categories", &[], |response| {
            calls += 1;
            async move { Client::decode::<Envelope>(response).await.map(|e| e.results) }
        })
        .await
        .unwrap();

        assert_eq!(calls, 2);
        assert_eq!(items, vec![Item { id: 1 }, Item { id: 2 }]);
    }

    #[tokio::test]
    async fn page_errors_abort_collection() {
        let server = MockServer::start().await;
        let base = server.uri();
        Mock::given(method("GET"))
            .and(query_param_is_missing("page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("link", format!(r#"<{base}/12345/products?page=2>; rel="next""#).as_str())
                    .set_body_string(r#"[{"id":1}]"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = collect_all_json::<Item>(&client(&server), "products", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn self_referencing_next_link_stops() {
        let server = MockServer::start().await;
        let base = server.uri();
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("link", format!(r#"<{base}/12345/products>; rel="next""#).as_str())
                    .set_body_string(r#"[{"id":1}]"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let items = collect_all_json::<Item>(&client(&server), "products", &[])
            .await
            .unwrap();
        assert_eq!(items, vec![Item { id: 1 }]);
    }

    #[tokio::test]
    async fn two_page_cycle_stops_after_each_page_once() {
        let server = MockServer::start().await;
        let base = server.uri();
        Mock::given(method("GET"))
            .and(query_param_is_missing("page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("link", format!(r#"<{base}/12345/products?page=2>; rel="next""#).as_str())
                    .set_body_string(r#"[{"id":1}]"#),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("link", format!(r#"<{base}/12345/products>; rel="next""#).as_str())
                    .set_body_string(r#"[{"id":2}]"#),
            )
            .expect(1)
            .mount(&server)
            .await;

        let items = tokio::time::timeout(
            Duration::from_secs(5),
            collect_all_json::<Item>(&client(&server), "products", &[]),
        )
        .await
        .expect("cycle must terminate")
        .unwrap();
        assert_eq!(items, vec![Item { id: 1 }, Item { id: 2 }]);
    }
}
