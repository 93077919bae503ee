//! Request builder, response parser and blocking proxy for the account server.
//!
//! # Design
//! `AccountClient` holds the server URL, the access token and a transport,
//! none of which change after construction. Each operation is split into a
//! `build_*` method that validates arguments and produces an `HttpRequest`,
//! and a `parse_*` method that consumes an `HttpResponse`. The plain method
//! (`create_application`, `grant`, ...) runs both around one
//! `Transport::execute` call. Hosts doing their own I/O use the halves
//! directly.

use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug_span, field, warn, Span};

use crate::config::ClientConfig;
use crate::error::{AccountError, Resource};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
use crate::types::{AccessKey, AppEui, Application, ChangeName, CreateApplication, Right, RightsRequest};

/// Proxy for one account on one account server.
#[derive(Clone)]
pub struct AccountClient<T = UreqTransport> {
    server: String,
    access_token: String,
    transport: T,
    context: Option<Span>,
}

impl AccountClient<UreqTransport> {
    /// Client using a default blocking transport. Does not touch the network.
    pub fn new(server: &str, access_token: &str) -> Self {
        Self::with_transport(server, access_token, UreqTransport::default())
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::with_transport(
            &config.server,
            &config.access_token,
            UreqTransport::new(config.timeout()),
        )
    }
}

impl<T> AccountClient<T> {
    pub fn with_transport(server: &str, access_token: &str, transport: T) -> Self {
        Self {
            server: server.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            transport,
            context: None,
        }
    }

    /// Parent span for the spans this client opens around each operation.
    pub fn in_span(mut self, span: Span) -> Self {
        self.context = Some(span);
        self
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    // -----------------------------------------------------------------------
    // Build
    // -----------------------------------------------------------------------

    pub fn build_list_applications(&self) -> HttpRequest {
        self.request(HttpMethod::Get, "/applications".to_string(), None)
    }

    pub fn build_find_application(&self, app_id: &str) -> Result<HttpRequest, AccountError> {
        require("application id", app_id)?;
        Ok(self.request(HttpMethod::Get, app_path(app_id), None))
    }

    pub fn build_create_application(
        &self,
        app_id: &str,
        name: &str,
        euis: &[AppEui],
    ) -> Result<HttpRequest, AccountError> {
        require("application id", app_id)?;
        require("application name", name)?;
        let unique: BTreeSet<AppEui> = euis.iter().copied().collect();
        let euis: Vec<AppEui> = unique.into_iter().collect();
        let body = encode(&CreateApplication {
            name,
            id: app_id,
            euis: &euis,
        })?;
        Ok(self.request(HttpMethod::Post, "/applications".to_string(), Some(body)))
    }

    pub fn build_delete_application(&self, app_id: &str) -> Result<HttpRequest, AccountError> {
        require("application id", app_id)?;
        Ok(self.request(HttpMethod::Delete, app_path(app_id), None))
    }

    pub fn build_grant(
        &self,
        app_id: &str,
        username: &str,
        rights: &[Right],
    ) -> Result<HttpRequest, AccountError> {
        self.rights_request(app_id, username, rights, "grant")
    }

    pub fn build_retract(
        &self,
        app_id: &str,
        username: &str,
        rights: &[Right],
    ) -> Result<HttpRequest, AccountError> {
        self.rights_request(app_id, username, rights, "retract")
    }

    pub fn build_add_access_key(
        &self,
        app_id: &str,
        key: &AccessKey,
    ) -> Result<HttpRequest, AccountError> {
        require("application id", app_id)?;
        require("access key", &key.key)?;
        let body = encode(key)?;
        let path = format!("{}/access-keys", app_path(app_id));
        Ok(self.request(HttpMethod::Post, path, Some(body)))
    }

    pub fn build_remove_access_key(
        &self,
        app_id: &str,
        key: &AccessKey,
    ) -> Result<HttpRequest, AccountError> {
        require("application id", app_id)?;
        require("access key", &key.key)?;
        let path = format!("{}/access-keys/{}", app_path(app_id), urlencoding::encode(&key.key));
        Ok(self.request(HttpMethod::Delete, path, None))
    }

    pub fn build_change_name(&self, app_id: &str, name: &str) -> Result<HttpRequest, AccountError> {
        require("application id", app_id)?;
        require("application name", name)?;
        let body = encode(&ChangeName { name })?;
        Ok(self.request(HttpMethod::Put, app_path(app_id), Some(body)))
    }

    pub fn build_add_eui(&self, app_id: &str, eui: &AppEui) -> Result<HttpRequest, AccountError> {
        require("application id", app_id)?;
        Ok(self.request(HttpMethod::Put, eui_path(app_id, eui), None))
    }

    pub fn build_remove_eui(&self, app_id: &str, eui: &AppEui) -> Result<HttpRequest, AccountError> {
        require("application id", app_id)?;
        Ok(self.request(HttpMethod::Delete, eui_path(app_id, eui), None))
    }

    fn rights_request(
        &self,
        app_id: &str,
        username: &str,
        rights: &[Right],
        action: &str,
    ) -> Result<HttpRequest, AccountError> {
        require("application id", app_id)?;
        require("username", username)?;
        if rights.is_empty() {
            return Err(AccountError::Validation("rights must not be empty".to_string()));
        }
        let unique: BTreeSet<Right> = rights.iter().copied().collect();
        let body = encode(&RightsRequest {
            rights: unique.into_iter().collect(),
        })?;
        let path = format!(
            "{}/collaborators/{}/{action}",
            app_path(app_id),
            urlencoding::encode(username)
        );
        Ok(self.request(HttpMethod::Post, path, Some(body)))
    }

    fn request(&self, method: HttpMethod, path: String, body: Option<String>) -> HttpRequest {
        let mut headers = vec![(
            "authorization".to_string(),
            format!("Bearer {}", self.access_token),
        )];
        if body.is_some() {
            headers.push(("content-type".to_string(), "application/json".to_string()));
        }
        HttpRequest {
            method,
            path: format!("{}{path}", self.server),
            headers,
            body,
        }
    }

    // -----------------------------------------------------------------------
    // Parse
    // -----------------------------------------------------------------------

    pub fn parse_list_applications(&self, response: HttpResponse) -> Result<Vec<Application>, AccountError> {
        check_auth(&response)?;
        if response.status != 200 {
            return Err(decode_failure(&response, "expected 200 OK"));
        }
        decode(&response)
    }

    pub fn parse_find_application(
        &self,
        app_id: &str,
        response: HttpResponse,
    ) -> Result<Application, AccountError> {
        check_auth(&response)?;
        if response.status != 200 {
            return Err(AccountError::NotFound(Resource::Application(app_id.to_string())));
        }
        decode(&response)
    }

    pub fn parse_create_application(
        &self,
        app_id: &str,
        response: HttpResponse,
    ) -> Result<Application, AccountError> {
        check_auth(&response)?;
        match response.status {
            201 => decode(&response),
            409 => Err(AccountError::Conflict(Resource::Application(app_id.to_string()))),
            status => Err(AccountError::Creation {
                status,
                status_text: response.status_text(),
            }),
        }
    }

    pub fn parse_delete_application(&self, app_id: &str, response: HttpResponse) -> Result<(), AccountError> {
        check_auth(&response)?;
        match response.status {
            200 | 204 => Ok(()),
            404 => Err(AccountError::NotFound(Resource::Application(app_id.to_string()))),
            status => Err(AccountError::Deletion {
                status,
                status_text: response.status_text(),
            }),
        }
    }

    pub fn parse_grant(&self, app_id: &str, username: &str, response: HttpResponse) -> Result<(), AccountError> {
        check_update("grant", &response, || Resource::Collaborator {
            app_id: app_id.to_string(),
            username: username.to_string(),
        })
    }

    pub fn parse_retract(&self, app_id: &str, username: &str, response: HttpResponse) -> Result<(), AccountError> {
        check_update("retract", &response, || Resource::Collaborator {
            app_id: app_id.to_string(),
            username: username.to_string(),
        })
    }

    pub fn parse_add_access_key(&self, app_id: &str, response: HttpResponse) -> Result<(), AccountError> {
        if response.status == 409 {
            return Err(AccountError::Conflict(Resource::AccessKey {
                app_id: app_id.to_string(),
            }));
        }
        check_update("add access key", &response, || Resource::Application(app_id.to_string()))
    }

    /// A key that is not attached is not an error; the server answers 204.
    pub fn parse_remove_access_key(&self, app_id: &str, response: HttpResponse) -> Result<(), AccountError> {
        check_update("remove access key", &response, || Resource::Application(app_id.to_string()))
    }

    pub fn parse_change_name(&self, app_id: &str, response: HttpResponse) -> Result<(), AccountError> {
        check_update("change name", &response, || Resource::Application(app_id.to_string()))
    }

    pub fn parse_add_eui(&self, app_id: &str, response: HttpResponse) -> Result<(), AccountError> {
        check_update("add eui", &response, || Resource::Application(app_id.to_string()))
    }

    pub fn parse_remove_eui(&self, app_id: &str, response: HttpResponse) -> Result<(), AccountError> {
        check_update("remove eui", &response, || Resource::Application(app_id.to_string()))
    }

    fn span(&self, operation: &'static str, app_id: Option<&str>) -> Span {
        let parent = self.context.clone().unwrap_or_else(Span::current);
        let span = debug_span!(parent: &parent, "account", operation, app_id = field::Empty);
        if let Some(app_id) = app_id {
            span.record("app_id", app_id);
        }
        span
    }
}

impl<T: Transport> AccountClient<T> {
    pub fn list_applications(&self) -> Result<Vec<Application>, AccountError> {
        let _guard = self.span("list_applications", None).entered();
        let response = self.transport.execute(self.build_list_applications())?;
        self.parse_list_applications(response)
    }

    pub fn find_application(&self, app_id: &str) -> Result<Application, AccountError> {
        let _guard = self.span("find_application", Some(app_id)).entered();
        let response = self.transport.execute(self.build_find_application(app_id)?)?;
        self.parse_find_application(app_id, response)
    }

    pub fn create_application(
        &self,
        app_id: &str,
        name: &str,
        euis: &[AppEui],
    ) -> Result<Application, AccountError> {
        let _guard = self.span("create_application", Some(app_id)).entered();
        let response = self
            .transport
            .execute(self.build_create_application(app_id, name, euis)?)?;
        self.parse_create_application(app_id, response)
    }

    pub fn delete_application(&self, app_id: &str) -> Result<(), AccountError> {
        let _guard = self.span("delete_application", Some(app_id)).entered();
        let response = self.transport.execute(self.build_delete_application(app_id)?)?;
        self.parse_delete_application(app_id, response)
    }

    /// Add `rights` to what `username` holds on the application.
    pub fn grant(&self, app_id: &str, username: &str, rights: &[Right]) -> Result<(), AccountError> {
        let _guard = self.span("grant", Some(app_id)).entered();
        let response = self.transport.execute(self.build_grant(app_id, username, rights)?)?;
        self.parse_grant(app_id, username, response)
    }

    /// Remove `rights` from `username`. Rights they do not hold are ignored.
    pub fn retract(&self, app_id: &str, username: &str, rights: &[Right]) -> Result<(), AccountError> {
        let _guard = self.span("retract", Some(app_id)).entered();
        let response = self.transport.execute(self.build_retract(app_id, username, rights)?)?;
        self.parse_retract(app_id, username, response)
    }

    pub fn add_access_key(&self, app_id: &str, key: &AccessKey) -> Result<(), AccountError> {
        let _guard = self.span("add_access_key", Some(app_id)).entered();
        let response = self.transport.execute(self.build_add_access_key(app_id, key)?)?;
        self.parse_add_access_key(app_id, response)
    }

    pub fn remove_access_key(&self, app_id: &str, key: &AccessKey) -> Result<(), AccountError> {
        let _guard = self.span("remove_access_key", Some(app_id)).entered();
        let response = self.transport.execute(self.build_remove_access_key(app_id, key)?)?;
        self.parse_remove_access_key(app_id, response)
    }

    pub fn change_name(&self, app_id: &str, name: &str) -> Result<(), AccountError> {
        let _guard = self.span("change_name", Some(app_id)).entered();
        let response = self.transport.execute(self.build_change_name(app_id, name)?)?;
        self.parse_change_name(app_id, response)
    }

    pub fn add_eui(&self, app_id: &str, eui: &AppEui) -> Result<(), AccountError> {
        let _guard = self.span("add_eui", Some(app_id)).entered();
        let response = self.transport.execute(self.build_add_eui(app_id, eui)?)?;
        self.parse_add_eui(app_id, response)
    }

    pub fn remove_eui(&self, app_id: &str, eui: &AppEui) -> Result<(), AccountError> {
        let _guard = self.span("remove_eui", Some(app_id)).entered();
        let response = self.transport.execute(self.build_remove_eui(app_id, eui)?)?;
        self.parse_remove_eui(app_id, response)
    }
}

impl<T> std::fmt::Debug for AccountClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountClient")
            .field("server", &self.server)
            .field("access_token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

fn app_path(app_id: &str) -> String {
    format!("/applications/{}", urlencoding::encode(app_id))
}

fn eui_path(app_id: &str, eui: &AppEui) -> String {
    format!("{}/euis/{eui}", app_path(app_id))
}

fn require(what: &str, value: &str) -> Result<(), AccountError> {
    if value.is_empty() {
        return Err(AccountError::Validation(format!("{what} must not be empty")));
    }
    Ok(())
}

fn encode<B: Serialize>(body: &B) -> Result<String, AccountError> {
    serde_json::to_string(body).map_err(|e| AccountError::Encode(e.to_string()))
}

fn decode<R: DeserializeOwned>(response: &HttpResponse) -> Result<R, AccountError> {
    serde_json::from_str(&response.body).map_err(|e| AccountError::decode(response.status, &response.body, e))
}

fn decode_failure(response: &HttpResponse, message: &str) -> AccountError {
    warn!(status = response.status, "unexpected status");
    AccountError::Decode {
        status: response.status,
        excerpt: crate::error::excerpt(&response.body),
        message: message.to_string(),
    }
}

fn check_auth(response: &HttpResponse) -> Result<(), AccountError> {
    match response.status {
        401 | 403 => {
            warn!(status = response.status, "access token rejected");
            Err(AccountError::Unauthorized {
                status: response.status,
            })
        }
        _ => Ok(()),
    }
}

/// Status mapping shared by the mutations that return no entity.
fn check_update(
    operation: &'static str,
    response: &HttpResponse,
    resource: impl FnOnce() -> Resource,
) -> Result<(), AccountError> {
    check_auth(response)?;
    match response.status {
        200 | 201 | 204 => Ok(()),
        404 => Err(AccountError::NotFound(resource())),
        400 | 422 => Err(AccountError::Validation(server_message(response))),
        status => {
            warn!(operation, status, "unexpected status");
            Err(AccountError::Update {
                operation,
                status,
                status_text: response.status_text(),
            })
        }
    }
}

/// The `error` field of a JSON error body, or the raw body excerpt.
fn server_message(response: &HttpResponse) -> String {
    serde_json::from_str::<serde_json::Value>(&response.body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| crate::error::excerpt(&response.body))
}
