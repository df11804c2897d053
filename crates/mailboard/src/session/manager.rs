//! Session manager
//!
//! Every outgoing API call is stamped and sent through here. A 401 on an
//! eligible request triggers a refresh (single-flight via
//! `RefreshCoordinator`) and a replay of the request with the new token.
//! When the refresh itself fails, the session is torn down and the
//! listener is told that sign-in is required, once.

use chrono::Utc;
use log::{debug, info, warn};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::jwt;
use super::refresh::{RefreshCoordinator, RefreshError, Turn};
use super::state::{LogListener, PreviewSink, Session, SessionListener, User};
use crate::cache::PREVIEWS_KEY;
use crate::http::{ApiError, ApiRequest, ApiResponse, Transport, UNAUTHORIZED, envelope};
use crate::storage::{self, LocalStore};

/// Cookie-based refresh endpoint
pub const REFRESH_PATH: &str = "/auth/refresh";
/// Current user profile endpoint
pub const ME_PATH: &str = "/auth/me";
/// Local store key of the credential kept for startup validation
pub const STORED_TOKEN_KEY: &str = "access_token";

/// Owns the credential and coordinates refresh for all API calls
///
/// Shared by every component that talks to the API as `Arc<SessionManager>`.
pub struct SessionManager {
    transport: Arc<dyn Transport>,
    store: Arc<dyn LocalStore>,
    session: RwLock<Session>,
    refresh: RefreshCoordinator,
    /// Latched once sign-in has been requested
    sign_in_requested: AtomicBool,
    listener: Arc<dyn SessionListener>,
    /// Caches purged together with the session
    caches: RwLock<Vec<Arc<dyn PreviewSink>>>,
}

/// Keeps `initializing` set for the lifetime of the guard
struct InitializingGuard<'a> {
    session: &'a RwLock<Session>,
}

impl<'a> InitializingGuard<'a> {
    fn new(session: &'a RwLock<Session>) -> Self {
        write(session).initializing = true;
        Self { session }
    }
}

impl Drop for InitializingGuard<'_> {
    fn drop(&mut self) {
        write(self.session).initializing = false;
    }
}

fn read(session: &RwLock<Session>) -> RwLockReadGuard<'_, Session> {
    session.read().unwrap_or_else(PoisonError::into_inner)
}

fn write(session: &RwLock<Session>) -> RwLockWriteGuard<'_, Session> {
    session.write().unwrap_or_else(PoisonError::into_inner)
}

impl SessionManager {
    /// Create a session manager with an empty session
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn LocalStore>) -> Self {
        Self {
            transport,
            store,
            session: RwLock::new(Session::default()),
            refresh: RefreshCoordinator::new(),
            sign_in_requested: AtomicBool::new(false),
            listener: Arc::new(LogListener),
            caches: RwLock::new(Vec::new()),
        }
    }

    /// Replace the listener notified when sign-in is required
    pub fn with_listener(mut self, listener: Arc<dyn SessionListener>) -> Self {
        self.listener = listener;
        self
    }

    /// Snapshot of the current session
    pub fn session(&self) -> Session {
        read(&self.session).clone()
    }

    pub fn access_token(&self) -> Option<String> {
        read(&self.session).access_token.clone()
    }

    pub fn user(&self) -> Option<User> {
        read(&self.session).user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        read(&self.session).is_authenticated()
    }

    pub fn is_initializing(&self) -> bool {
        read(&self.session).initializing
    }

    /// Whether a refresh call is currently outstanding
    pub fn is_refreshing(&self) -> bool {
        self.refresh.is_refreshing()
    }

    /// Number of requests waiting on the outstanding refresh
    pub fn queued_requests(&self) -> usize {
        self.refresh.queued()
    }

    /// Register a cache to purge whenever the session is torn down
    ///
    /// Registering the same cache twice has no effect.
    pub fn attach_cache(&self, cache: Arc<dyn PreviewSink>) {
        let mut caches = self.caches.write().unwrap_or_else(PoisonError::into_inner);
        if !caches.iter().any(|c| Arc::ptr_eq(c, &cache)) {
            caches.push(cache);
        }
    }

    /// The local store this session persists into
    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    // === Request pipeline ===

    /// Stamp the current access token onto a request
    pub fn issue(&self, mut request: ApiRequest) -> ApiRequest {
        if let Some(token) = self.access_token() {
            request.set_bearer(&token);
        }
        request
    }

    /// Issue, send, and recover from a 401 by refreshing and replaying
    pub fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.dispatch(self.issue(request))
    }

    /// `execute` and parse the body as JSON
    pub fn execute_json(&self, request: ApiRequest) -> Result<Value, ApiError> {
        self.execute(request)?.json_value()
    }

    fn dispatch(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let response = self.transport.send(&request)?;
        if response.status == UNAUTHORIZED {
            return self.on_unauthorized(request);
        }
        response.error_for_status(&request.path)
    }

    fn on_unauthorized(&self, mut request: ApiRequest) -> Result<ApiResponse, ApiError> {
        if request.targets(REFRESH_PATH) || request.retried || !request.refreshable {
            return Err(ApiError::Unauthorized { path: request.path });
        }
        request.retried = true;

        // Rotated since this request was stamped: replay with the current token
        if let Some(current) = self.access_token()
            && request.bearer_token() != Some(current.as_str())
        {
            debug!("Replaying {} with rotated credential", request.path);
            request.set_bearer(&current);
            return self.dispatch(request);
        }

        match self.refresh.begin(Some(request.clone())) {
            Turn::Wait(waiter) => {
                debug!("Refresh outstanding, queueing {}", request.path);
                let replay = waiter.wait()?;
                self.dispatch(replay.request.unwrap_or(request))
            }
            Turn::Lead => {
                let token = self.lead_refresh(true)?;
                request.set_bearer(&token);
                self.dispatch(request)
            }
        }
    }

    // === Refresh ===

    /// Obtain a new access token, joining an outstanding refresh if any
    pub fn refresh(&self) -> Result<String, RefreshError> {
        self.refresh_with(true)
    }

    fn refresh_with(&self, notify: bool) -> Result<String, RefreshError> {
        match self.refresh.begin(None) {
            Turn::Wait(waiter) => waiter.wait().map(|replay| replay.token),
            Turn::Lead => self.lead_refresh(notify),
        }
    }

    /// Perform the refresh call as leader and settle the cycle
    fn lead_refresh(&self, notify: bool) -> Result<String, RefreshError> {
        info!("Refreshing session");
        let outcome = self.request_new_token();

        match &outcome {
            Ok(token) => {
                write(&self.session).access_token = Some(token.clone());
                self.store_credential(token);
            }
            Err(e) => {
                warn!("Session refresh failed: {}", e);
                self.clear_local_state();
            }
        }

        let woken = self.refresh.settle(&outcome);
        debug!("Refresh settled, woke {} queued callers", woken);

        if outcome.is_err() && notify {
            self.require_sign_in();
        }
        outcome
    }

    fn request_new_token(&self) -> Result<String, RefreshError> {
        let request = ApiRequest::post(REFRESH_PATH);
        let response = self
            .transport
            .send(&request)?
            .error_for_status(REFRESH_PATH)?;
        let body = response.json_value()?;
        envelope::extract_access_token(&body).map_err(|_| RefreshError::MissingToken)
    }

    fn require_sign_in(&self) {
        if self.sign_in_requested.swap(true, Ordering::SeqCst) {
            debug!("Sign-in already requested");
            return;
        }
        self.listener.on_sign_in_required();
    }

    // === Startup ===

    /// Validate or recover a session at process start
    ///
    /// 1. A stored, unexpired credential is checked against the profile endpoint
    /// 2. Otherwise the cookie-based refresh is tried once
    /// 3. If both fail the stored credential is dropped
    ///
    /// Returns whether a session was established.
    pub fn startup_validate(&self) -> bool {
        let _initializing = InitializingGuard::new(&self.session);

        if let Some(stored) = storage::load_json::<String>(self.store.as_ref(), STORED_TOKEN_KEY) {
            if jwt::is_expired(&stored, Utc::now()) {
                debug!("Stored credential expired, skipping profile check");
            } else {
                match self.fetch_profile(&stored) {
                    Ok(user) => {
                        info!("Restored session for {}", user.email);
                        self.adopt(Some(stored), Some(user));
                        return true;
                    }
                    Err(e) => debug!("Stored credential rejected: {}", e),
                }
            }
        }

        match self.refresh_with(false) {
            Ok(token) => match self.fetch_profile(&token) {
                Ok(user) => {
                    info!("Session refreshed for {}", user.email);
                    self.adopt(Some(token), Some(user));
                    return true;
                }
                Err(e) => debug!("Profile fetch failed after refresh: {}", e),
            },
            Err(e) => debug!("Startup refresh failed: {}", e),
        }

        self.clear_local_state();
        false
    }

    fn fetch_profile(&self, token: &str) -> Result<User, ApiError> {
        let mut request = ApiRequest::get(ME_PATH).without_refresh();
        request.set_bearer(token);
        let body = self.dispatch(request)?.json_value()?;
        envelope::extract_profile(&body)
            .ok_or_else(|| ApiError::Decode("profile response did not contain a user".into()))
    }

    // === Sign-in / sign-out ===

    /// Sign in with email and password
    pub fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        self.sign_in(
            ApiRequest::post("/auth/login").json(json!({ "email": email, "password": password })),
        )
    }

    /// Create an account and sign in
    pub fn register(&self, email: &str, password: &str, name: &str) -> Result<User, ApiError> {
        self.sign_in(ApiRequest::post("/auth/register").json(json!({
            "email": email,
            "password": password,
            "name": name,
        })))
    }

    /// Sign in with a Google ID token credential
    pub fn google_sign_in(&self, credential: &str) -> Result<User, ApiError> {
        self.sign_in(ApiRequest::post("/auth/google").json(json!({ "credential": credential })))
    }

    /// Sign in with a Google authorization code (redirect flow)
    pub fn google_code_sign_in(&self, code: &str) -> Result<User, ApiError> {
        self.sign_in(ApiRequest::post("/auth/google").json(json!({ "code": code })))
    }

    /// URL to start the Google redirect flow
    pub fn google_auth_url(&self) -> Result<String, ApiError> {
        let body = self.execute_json(ApiRequest::get("/auth/google/url").without_refresh())?;
        let data = envelope::payload(&body);
        data.as_str()
            .or_else(|| envelope::first_field(data, &["url", "authUrl", "auth_url"]).and_then(Value::as_str))
            .map(str::to_string)
            .ok_or_else(|| ApiError::Decode("missing Google auth URL".into()))
    }

    fn sign_in(&self, request: ApiRequest) -> Result<User, ApiError> {
        let path = request.path.clone();
        let body = self.execute_json(request.without_refresh())?;

        let token = envelope::extract_sign_in_token(&body).ok();
        if token.is_none() {
            warn!("{} response carried no access token", path);
        }
        let user = envelope::extract_user(&body);
        self.adopt(token, user.clone());

        let user = user.ok_or_else(|| ApiError::Decode(format!("{} response did not contain a user", path)))?;
        info!("Signed in as {}", user.email);
        Ok(user)
    }

    /// Fetch the current profile and adopt it
    pub fn me(&self) -> Result<User, ApiError> {
        let body = self.execute_json(ApiRequest::get(ME_PATH))?;
        let user = envelope::extract_profile(&body)
            .ok_or_else(|| ApiError::Decode("profile response did not contain a user".into()))?;
        write(&self.session).user = Some(user.clone());
        Ok(user)
    }

    /// Sign out on the server and drop all local session state
    ///
    /// Local state is cleared even when the server call fails; the server
    /// error is still returned.
    pub fn logout(&self) -> Result<(), ApiError> {
        let result = self
            .execute(ApiRequest::post("/auth/logout").without_refresh())
            .map(|_| ());
        if let Err(e) = &result {
            warn!("Server logout failed: {}", e);
        }
        self.clear_local_state();
        info!("Signed out");
        result
    }

    // === Local state ===

    fn adopt(&self, token: Option<String>, user: Option<User>) {
        if let Some(token) = &token {
            self.store_credential(token);
        }
        let mut session = write(&self.session);
        if token.is_some() {
            session.access_token = token;
        }
        if user.is_some() {
            session.user = user;
        }
    }

    fn store_credential(&self, token: &str) {
        if let Err(e) = storage::save_json(self.store.as_ref(), STORED_TOKEN_KEY, &token) {
            warn!("Failed to persist credential: {}", e);
        }
    }

    /// Drop token, user, stored credential and cached previews
    fn clear_local_state(&self) {
        {
            let mut session = write(&self.session);
            session.access_token = None;
            session.user = None;
        }
        for key in [STORED_TOKEN_KEY, PREVIEWS_KEY] {
            if let Err(e) = self.store.remove(key) {
                warn!("Failed to remove {} from local state: {}", key, e);
            }
        }

        let caches = self
            .caches
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for cache in &caches {
            cache.purge();
        }
        debug!("Purged {} attached caches", caches.len());
    }
}
