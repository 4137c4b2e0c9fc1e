// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Authenticated HTTP client for the upstream control panel.
//!
//! The upstream speaks two response dialects: a structured JSON form on
//! newer versions and a legacy flat `list[]=a.com&list[]=b.com` form on
//! older ones. Listing prefers JSON and falls back to legacy parsing. On a
//! 401 the client performs one legacy session login (`CMD_LOGIN`, session
//! cookie) and replays the request, which newer upstream versions require
//! for API users.

use crate::constants::{UPSTREAM_LIST_PAGE_SIZE, UPSTREAM_LIST_TIMEOUT};
use crate::errors::UpstreamError;
use crate::zone::canonical_zone_name;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Upstream command for listing owned domains.
const CMD_SHOW_DOMAINS: &str = "CMD_API_SHOW_DOMAINS";

/// Upstream command for DNS administration (also used for extra-server
/// registration).
const CMD_DNS_ADMIN: &str = "CMD_API_DNS_ADMIN";

/// Upstream command for the legacy session login.
const CMD_LOGIN: &str = "CMD_LOGIN";

/// Structured or legacy-wrapped domain list payload.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DomainListResponse {
    /// Newer upstreams return a flat JSON array
    Flat(Vec<String>),
    /// Some versions wrap the array with paging metadata
    Paged {
        domains: Vec<String>,
        #[serde(default)]
        #[allow(dead_code)]
        total: Option<usize>,
    },
}

/// Parse the legacy flat `list[]=a.com&list[]=b.com` response body.
#[must_use]
pub fn parse_legacy_list(body: &str) -> Vec<String> {
    url::form_urlencoded::parse(body.trim().as_bytes())
        .filter(|(key, _)| key == "list[]")
        .map(|(_, value)| canonical_zone_name(&value))
        .filter(|domain| !domain.is_empty())
        .collect()
}

/// Client for one configured upstream server.
pub struct UpstreamClient {
    http: reqwest::Client,
    hostname: String,
    base_url: String,
    username: String,
    password: String,
    /// Session cookie captured by the legacy login fallback
    session: Mutex<Option<String>>,
}

impl UpstreamClient {
    /// Build a client from the shared HTTP client and one upstream's
    /// configuration.
    #[must_use]
    pub fn new(http: reqwest::Client, config: &crate::config::UpstreamConfig) -> Self {
        Self {
            http,
            hostname: config.hostname.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            session: Mutex::new(None),
        }
    }

    /// The upstream hostname this client talks to.
    #[must_use]
    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    fn command_url(&self, command: &str) -> String {
        format!("{}/{command}", self.base_url)
    }

    fn request_error(&self, command: &str, reason: impl std::fmt::Display) -> UpstreamError {
        UpstreamError::RequestFailed {
            host: self.hostname.clone(),
            command: command.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Legacy session login: post credentials, capture the session cookie.
    async fn login(&self) -> Result<(), UpstreamError> {
        let url = self.command_url(CMD_LOGIN);
        let response = self
            .http
            .post(&url)
            .form(&[
                ("username", self.username.as_str()),
                ("password", self.password.as_str()),
                ("referer", "/"),
            ])
            .send()
            .await
            .map_err(|e| self.request_error(CMD_LOGIN, e))?;

        let cookie = response
            .headers()
            .get(reqwest::header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(';').next())
            .map(ToString::to_string);

        match cookie {
            Some(cookie) => {
                debug!(host = %self.hostname, "Legacy session login succeeded");
                *self.session.lock().await = Some(cookie);
                Ok(())
            }
            None => Err(UpstreamError::AuthFailed {
                host: self.hostname.clone(),
                reason: format!("login returned {} without a session cookie", response.status()),
            }),
        }
    }

    /// Execute an authenticated GET against an upstream command.
    ///
    /// On a 401 the legacy login is attempted once and the request replayed
    /// with the session cookie.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, auth failure after the login
    /// fallback, or a non-success status.
    pub async fn get(
        &self,
        command: &str,
        params: &[(&str, String)],
    ) -> Result<String, UpstreamError> {
        let url = self.command_url(command);

        let mut request = self
            .http
            .get(&url)
            .query(params)
            .basic_auth(&self.username, Some(&self.password))
            .timeout(UPSTREAM_LIST_TIMEOUT);
        if let Some(cookie) = self.session.lock().await.clone() {
            request = request.header(reqwest::header::COOKIE, cookie);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.request_error(command, e))?;

        let response = if response.status() == StatusCode::UNAUTHORIZED {
            warn!(host = %self.hostname, command, "Upstream rejected credentials, retrying with session login");
            self.login().await?;
            let cookie = self.session.lock().await.clone().unwrap_or_default();
            self.http
                .get(&url)
                .query(params)
                .header(reqwest::header::COOKIE, cookie)
                .timeout(UPSTREAM_LIST_TIMEOUT)
                .send()
                .await
                .map_err(|e| self.request_error(command, e))?
        } else {
            response
        };

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(UpstreamError::AuthFailed {
                host: self.hostname.clone(),
                reason: "credentials rejected after session login".to_string(),
            });
        }
        if !status.is_success() {
            return Err(self.request_error(command, format!("HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| self.request_error(command, e))
    }

    /// List every domain this upstream owns, canonicalized.
    ///
    /// Pages through the structured JSON response; a legacy flat response
    /// on the first page is parsed whole (the legacy dialect does not
    /// paginate).
    ///
    /// # Errors
    ///
    /// Returns an error on request failure or an unparseable mid-pagination
    /// response.
    pub async fn list_domains(&self) -> Result<Vec<String>, UpstreamError> {
        let mut all: Vec<String> = Vec::new();
        let mut page = 1usize;

        loop {
            let text = self
                .get(
                    CMD_SHOW_DOMAINS,
                    &[
                        ("json", "yes".to_string()),
                        ("ipp", UPSTREAM_LIST_PAGE_SIZE.to_string()),
                        ("page", page.to_string()),
                    ],
                )
                .await?;

            match serde_json::from_str::<DomainListResponse>(&text) {
                Ok(DomainListResponse::Flat(domains))
                | Ok(DomainListResponse::Paged { domains, .. }) => {
                    let count = domains.len();
                    all.extend(domains.iter().map(|d| canonical_zone_name(d)));
                    debug!(
                        host = %self.hostname,
                        page,
                        items_in_page = count,
                        total_items = all.len(),
                        "Fetched domain page from upstream"
                    );
                    if count < UPSTREAM_LIST_PAGE_SIZE {
                        break;
                    }
                    page += 1;
                }
                Err(_) if page == 1 => {
                    let domains = parse_legacy_list(&text);
                    if domains.is_empty() && !text.trim().is_empty() {
                        return Err(UpstreamError::MalformedResponse {
                            host: self.hostname.clone(),
                            command: CMD_SHOW_DOMAINS.to_string(),
                        });
                    }
                    info!(
                        host = %self.hostname,
                        domains = domains.len(),
                        "Upstream answered in legacy flat format"
                    );
                    all = domains;
                    break;
                }
                Err(_) => {
                    return Err(UpstreamError::MalformedResponse {
                        host: self.hostname.clone(),
                        command: CMD_SHOW_DOMAINS.to_string(),
                    });
                }
            }
        }

        Ok(all)
    }

    /// Idempotently register this node as an extra DNS server on the
    /// upstream, enforcing the `dns=yes` and `domain_check=yes` flags.
    ///
    /// # Errors
    ///
    /// Returns an error on request failure or an upstream-reported error
    /// that is not "already exists".
    pub async fn ensure_extra_dns_server(
        &self,
        self_url: &str,
        push_username: &str,
        push_password: &str,
    ) -> Result<(), UpstreamError> {
        let url = self.command_url(CMD_DNS_ADMIN);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.username, Some(&self.password))
            .form(&[
                ("action", "add_extra_server"),
                ("hostname", self_url),
                ("username", push_username),
                ("password", push_password),
                ("dns", "yes"),
                ("domain_check", "yes"),
            ])
            .send()
            .await
            .map_err(|e| self.request_error(CMD_DNS_ADMIN, e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.request_error(CMD_DNS_ADMIN, e))?;

        if !status.is_success() {
            return Err(self.request_error(CMD_DNS_ADMIN, format!("HTTP {status}: {body}")));
        }
        if body.contains("error=1") && !body.to_lowercase().contains("already") {
            return Err(self.request_error(CMD_DNS_ADMIN, format!("upstream error: {body}")));
        }

        info!(host = %self.hostname, self_url, "Registered as extra DNS server");
        Ok(())
    }
}

#[cfg(test)]
#[path = "upstream_tests.rs"]
mod upstream_tests;
