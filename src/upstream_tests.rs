// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Tests for the upstream control-panel client.

#[cfg(test)]
mod tests {
    use crate::config::UpstreamConfig;
    use crate::upstream::{parse_legacy_list, UpstreamClient};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> UpstreamClient {
        UpstreamClient::new(
            reqwest::Client::new(),
            &UpstreamConfig {
                hostname: "da1.example.net".to_string(),
                base_url: server.uri(),
                username: "admin".to_string(),
                password: "hunter2".to_string(),
            },
        )
    }

    #[test]
    fn test_parse_legacy_list() {
        let body = "list[]=a.example.com&list[]=B.Example.COM&list[]=c.example.com";
        assert_eq!(
            parse_legacy_list(body),
            vec!["a.example.com", "b.example.com", "c.example.com"]
        );
        assert!(parse_legacy_list("").is_empty());
    }

    #[tokio::test]
    async fn test_list_domains_structured_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/CMD_API_SHOW_DOMAINS"))
            .and(query_param("json", "yes"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(vec!["Alpha.Example", "beta.example"]),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let domains = client.list_domains().await.unwrap();
        assert_eq!(domains, vec!["alpha.example", "beta.example"]);
    }

    #[tokio::test]
    async fn test_list_domains_paginates() {
        let server = MockServer::start().await;
        let first_page: Vec<String> = (0..500).map(|i| format!("z{i}.example")).collect();
        Mock::given(method("GET"))
            .and(path("/CMD_API_SHOW_DOMAINS"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&first_page))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/CMD_API_SHOW_DOMAINS"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec!["last.example"]))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let domains = client.list_domains().await.unwrap();
        assert_eq!(domains.len(), 501);
        assert_eq!(domains.last().unwrap(), "last.example");
    }

    #[tokio::test]
    async fn test_list_domains_legacy_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/CMD_API_SHOW_DOMAINS"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("list[]=old1.example&list[]=old2.example"),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let domains = client.list_domains().await.unwrap();
        assert_eq!(domains, vec!["old1.example", "old2.example"]);
    }

    #[tokio::test]
    async fn test_session_login_fallback_on_401() {
        let server = MockServer::start().await;

        // With the session cookie the list succeeds.
        Mock::given(method("GET"))
            .and(path("/CMD_API_SHOW_DOMAINS"))
            .and(header("Cookie", "session=abc123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec!["cookie.example"]))
            .with_priority(1)
            .mount(&server)
            .await;
        // Without it, the upstream rejects basic auth.
        Mock::given(method("GET"))
            .and(path("/CMD_API_SHOW_DOMAINS"))
            .respond_with(ResponseTemplate::new(401))
            .with_priority(5)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/CMD_LOGIN"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("Set-Cookie", "session=abc123; path=/; httponly"),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let domains = client.list_domains().await.unwrap();
        assert_eq!(domains, vec!["cookie.example"]);
    }

    #[tokio::test]
    async fn test_auth_failure_after_login_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/CMD_API_SHOW_DOMAINS"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        // Login answers but grants no cookie.
        Mock::given(method("POST"))
            .and(path("/CMD_LOGIN"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.list_domains().await.unwrap_err();
        assert!(err.to_string().contains("Authentication"));
    }

    #[tokio::test]
    async fn test_ensure_extra_dns_server_ok_and_idempotent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/CMD_API_DNS_ADMIN"))
            .respond_with(ResponseTemplate::new(200).set_body_string("error=0&text=added"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/CMD_API_DNS_ADMIN"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("error=1&text=server already exists"),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        client
            .ensure_extra_dns_server("http://ns3.example.net:2222", "da-push", "push-secret")
            .await
            .unwrap();
        // Second registration reports "already exists" and still succeeds.
        client
            .ensure_extra_dns_server("http://ns3.example.net:2222", "da-push", "push-secret")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_ensure_extra_dns_server_error_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/CMD_API_DNS_ADMIN"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string("error=1&text=permission denied"),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .ensure_extra_dns_server("http://ns3.example.net:2222", "da-push", "push-secret")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("CMD_API_DNS_ADMIN"));
    }
}
