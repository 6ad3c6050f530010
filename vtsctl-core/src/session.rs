//! Session state machine for one VTube Studio connection
//!
//! The session never touches the socket. Every input (connection open,
//! inbound frame, operator command, close) returns a [`Transition`] that the
//! connection driver applies in order:
//! 1. persist the token, if one was issued
//! 2. send the outbound requests
//! 3. report the events
//! 4. close the connection, if asked

use std::collections::HashMap;

use thiserror::Error;

use crate::catalog::ExpressionCatalog;
use crate::credentials::Token;
use crate::protocol::{
    AuthenticationData, ExpressionActivation, ExpressionEntry, ExpressionStateData, ExpressionStateQuery,
    Inbound, MessageType, Outbound, PluginIdentity, Request, Response,
};

/// Authentication progress of the connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    Disconnected,
    AwaitingToken,
    Authenticating,
    Ready,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::AwaitingToken => "awaiting token",
            SessionState::Authenticating => "authenticating",
            SessionState::Ready => "ready",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session is not ready (currently {0})")]
    NotReady(SessionState),
}

/// Operator intents read from the command prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Activate a catalog expression, disabling the others
    Activate(String),
    /// `off <name>`
    Deactivate(String),
    /// Deactivate every catalog expression
    Reset,
    /// Ask for the model's expression list again
    List,
    Help,
    Quit,
    Unrecognized(String),
}

impl Command {
    /// Parse one line of operator input. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let first = words.first()?.to_lowercase();

        let cmd = match (first.as_str(), &words[1..]) {
            ("quit", []) => Command::Quit,
            ("reset", []) => Command::Reset,
            ("list", []) => Command::List,
            ("help" | "?", []) => Command::Help,
            ("off", [name]) => Command::Deactivate((*name).to_string()),
            ("off", _) => Command::Unrecognized(line.trim().to_string()),
            (word, []) => Command::Activate(word.to_string()),
            _ => Command::Unrecognized(line.trim().to_string()),
        };
        Some(cmd)
    }
}

/// Observable outcomes, rendered by the front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    TokenRequested,
    TokenIssued,
    AuthenticationStarted,
    Authenticated,
    AuthenticationRejected {
        reason: Option<String>,
    },
    ExpressionsListed {
        model_name: Option<String>,
        expressions: Vec<ExpressionEntry>,
    },
    ExpressionRequested {
        file: String,
        active: bool,
    },
    ResetRequested {
        count: usize,
    },
    ActivationConfirmed,
    ApiError {
        error_id: i64,
        message: String,
    },
    Menu {
        names: Vec<String>,
    },
    UnknownExpression {
        name: String,
    },
    Unrecognized {
        input: String,
    },
    /// Command needs a ready session
    CommandRejected {
        state: SessionState,
    },
    /// Known response that does not fit the current state
    Unexpected {
        message_type: String,
        state: SessionState,
    },
    QuitRequested,
    Disconnected {
        reason: String,
    },
}

/// Effects of one session input, applied by the driver in field order
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Transition {
    pub persist: Option<Token>,
    pub outbound: Vec<Outbound>,
    pub events: Vec<SessionEvent>,
    pub close: bool,
}

impl Transition {
    fn event(event: SessionEvent) -> Self {
        Self {
            events: vec![event],
            ..Default::default()
        }
    }

    /// Outbound requests of a given type
    pub fn requests_of(&self, message_type: MessageType) -> impl Iterator<Item = &Request> {
        self.outbound
            .iter()
            .map(|o| &o.request)
            .filter(move |r| r.message_type() == message_type)
    }
}

/// Decides what to activate once the post-authentication expression list arrives
pub trait DiscoveryPolicy: Send + Sync {
    fn after_discovery(
        &self,
        listed: &ExpressionStateData,
        catalog: &ExpressionCatalog,
    ) -> Option<ExpressionActivation>;
}

/// Leave the model as it is
#[derive(Debug, Default)]
pub struct NoDefault;

impl DiscoveryPolicy for NoDefault {
    fn after_discovery(&self, _: &ExpressionStateData, _: &ExpressionCatalog) -> Option<ExpressionActivation> {
        None
    }
}

/// Activate one catalog expression on top of whatever is active
#[derive(Debug)]
pub struct ActivateDefault {
    name: String,
    disable_others: bool,
}

impl ActivateDefault {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            disable_others: false,
        }
    }

    pub fn disable_others(mut self, disable_others: bool) -> Self {
        self.disable_others = disable_others;
        self
    }
}

impl DiscoveryPolicy for ActivateDefault {
    fn after_discovery(&self, _: &ExpressionStateData, catalog: &ExpressionCatalog) -> Option<ExpressionActivation> {
        let Some(file) = catalog.resolve(&self.name) else {
            tracing::warn!("Default expression {} is not in the catalog", self.name);
            return None;
        };

        Some(ExpressionActivation {
            expression_file: file.to_string(),
            active: true,
            disable_others: self.disable_others,
        })
    }
}

/// One authenticated conversation with VTube Studio
pub struct Session {
    state: SessionState,
    identity: PluginIdentity,
    token: Option<Token>,
    catalog: ExpressionCatalog,
    policy: Box<dyn DiscoveryPolicy>,
    /// Outstanding request IDs and the response type each expects
    pending: HashMap<String, MessageType>,
    next_id: u64,
    discovery_pending: bool,
}

impl Session {
    pub fn new(identity: PluginIdentity, catalog: ExpressionCatalog, token: Option<Token>) -> Self {
        Self {
            state: SessionState::Disconnected,
            identity,
            token,
            catalog,
            policy: Box::new(NoDefault),
            pending: HashMap::new(),
            next_id: 1,
            discovery_pending: false,
        }
    }

    pub fn with_policy(mut self, policy: Box<dyn DiscoveryPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn token(&self) -> Option<&Token> {
        self.token.as_ref()
    }

    pub fn catalog(&self) -> &ExpressionCatalog {
        &self.catalog
    }

    /// Drop a token that could not be saved
    pub fn forget_token(&mut self) {
        if self.token.take().is_some() {
            tracing::debug!("Discarded unsaved token");
        }
    }

    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Connection established: start the handshake
    pub fn on_open(&mut self) -> Transition {
        self.pending.clear();
        self.discovery_pending = false;

        let mut t = Transition::event(SessionEvent::Connected);
        match self.token.clone() {
            Some(token) => {
                t.outbound.push(self.authentication_request(&token));
                t.events.push(SessionEvent::AuthenticationStarted);
                self.enter(SessionState::Authenticating);
            }
            None => {
                let out = self.issue(Request::AuthenticationToken(self.identity.clone()));
                t.outbound.push(out);
                t.events.push(SessionEvent::TokenRequested);
                self.enter(SessionState::AwaitingToken);
            }
        }
        t
    }

    /// Dispatch one decoded inbound frame by message type
    pub fn on_inbound(&mut self, inbound: Inbound) -> Transition {
        self.retire(&inbound.request_id, &inbound.response);

        match (self.state, inbound.response) {
            (SessionState::AwaitingToken, Response::AuthenticationToken { token }) => {
                let Some(token) = Token::new(token) else {
                    tracing::warn!("VTube Studio issued a blank token");
                    return Transition::event(SessionEvent::AuthenticationRejected {
                        reason: Some("blank token issued".to_string()),
                    });
                };

                self.token = Some(token.clone());
                let auth = self.authentication_request(&token);
                self.enter(SessionState::Authenticating);
                Transition {
                    persist: Some(token),
                    outbound: vec![auth],
                    events: vec![SessionEvent::TokenIssued, SessionEvent::AuthenticationStarted],
                    close: false,
                }
            }

            (SessionState::Authenticating, Response::Authentication { authenticated: true, .. }) => {
                self.enter(SessionState::Ready);
                self.discovery_pending = true;
                let list = self.issue(Request::ExpressionState(ExpressionStateQuery {
                    details: true,
                    expression_file: String::new(),
                }));
                Transition {
                    outbound: vec![list],
                    events: vec![SessionEvent::Authenticated],
                    ..Default::default()
                }
            }

            (SessionState::Authenticating, Response::Authentication { authenticated: false, reason }) => {
                tracing::warn!("Authentication rejected: {}", reason.as_deref().unwrap_or("no reason given"));
                Transition::event(SessionEvent::AuthenticationRejected { reason })
            }

            (_, Response::ExpressionState(data)) => self.on_expression_state(data),

            (_, Response::ExpressionActivation) => Transition::event(SessionEvent::ActivationConfirmed),

            (_, Response::ApiError { error_id, message }) => {
                tracing::warn!("API error {}: {}", error_id, message);
                Transition::event(SessionEvent::ApiError { error_id, message })
            }

            (state, response) => {
                tracing::warn!("Ignoring {} while {}", response.type_name(), state);
                Transition::event(SessionEvent::Unexpected {
                    message_type: response.type_name().to_string(),
                    state,
                })
            }
        }
    }

    /// Connection closed or failed. No reconnect is attempted.
    pub fn on_close(&mut self, reason: impl Into<String>) -> Transition {
        let reason = reason.into();
        if !self.pending.is_empty() {
            tracing::debug!("{} request(s) left unanswered", self.pending.len());
        }
        self.pending.clear();
        self.discovery_pending = false;
        self.enter(SessionState::Disconnected);
        Transition::event(SessionEvent::Disconnected { reason })
    }

    /// Translate an operator command into requests
    pub fn handle_command(&mut self, command: Command) -> Transition {
        match command {
            Command::Quit => Transition {
                events: vec![SessionEvent::QuitRequested],
                close: true,
                ..Default::default()
            },

            Command::Help => Transition::event(SessionEvent::Menu {
                names: self.catalog.names().map(str::to_string).collect(),
            }),

            Command::Unrecognized(input) => Transition::event(SessionEvent::Unrecognized { input }),

            Command::Activate(name) | Command::Deactivate(name) if self.catalog.resolve(&name).is_none() => {
                Transition::event(SessionEvent::UnknownExpression { name })
            }

            Command::Activate(name) => {
                let file = self.catalog.resolve(&name).unwrap_or_default().to_string();
                let result = self.activate_expression(&file, true);
                Self::requested(result, file, true)
            }

            Command::Deactivate(name) => {
                let file = self.catalog.resolve(&name).unwrap_or_default().to_string();
                let result = self.deactivate_expression(&file);
                Self::requested(result, file, false)
            }

            Command::Reset => match self.deactivate_all() {
                Ok(outbound) => Transition {
                    events: vec![SessionEvent::ResetRequested { count: outbound.len() }],
                    outbound,
                    ..Default::default()
                },
                Err(SessionError::NotReady(state)) => Transition::event(SessionEvent::CommandRejected { state }),
            },

            Command::List => match self.request_expression_list() {
                Ok(out) => Transition {
                    outbound: vec![out],
                    ..Default::default()
                },
                Err(SessionError::NotReady(state)) => Transition::event(SessionEvent::CommandRejected { state }),
            },
        }
    }

    /// Ask for every expression of the loaded model, with details
    pub fn request_expression_list(&mut self) -> Result<Outbound, SessionError> {
        self.ensure_ready()?;
        Ok(self.issue(Request::ExpressionState(ExpressionStateQuery {
            details: true,
            expression_file: String::new(),
        })))
    }

    pub fn activate_expression(&mut self, file: &str, disable_others: bool) -> Result<Outbound, SessionError> {
        self.ensure_ready()?;
        Ok(self.issue(Request::ExpressionActivation(ExpressionActivation {
            expression_file: file.to_string(),
            active: true,
            disable_others,
        })))
    }

    pub fn deactivate_expression(&mut self, file: &str) -> Result<Outbound, SessionError> {
        self.ensure_ready()?;
        Ok(self.issue(Request::ExpressionActivation(ExpressionActivation {
            expression_file: file.to_string(),
            active: false,
            disable_others: false,
        })))
    }

    /// One deactivation per catalog entry, whether active or not
    pub fn deactivate_all(&mut self) -> Result<Vec<Outbound>, SessionError> {
        self.ensure_ready()?;
        let files: Vec<String> = self.catalog.files().map(str::to_string).collect();
        files.iter().map(|file| self.deactivate_expression(file)).collect()
    }

    // Private helpers

    fn on_expression_state(&mut self, data: ExpressionStateData) -> Transition {
        let mut t = Transition::default();

        if self.discovery_pending && self.state == SessionState::Ready {
            self.discovery_pending = false;
            if let Some(activation) = self.policy.after_discovery(&data, &self.catalog) {
                let file = activation.expression_file.clone();
                let active = activation.active;
                t.outbound.push(self.issue(Request::ExpressionActivation(activation)));
                t.events.push(SessionEvent::ExpressionRequested { file, active });
            }
        }

        t.events.insert(
            0,
            SessionEvent::ExpressionsListed {
                model_name: data.model_name,
                expressions: data.expressions,
            },
        );
        t
    }

    fn requested(result: Result<Outbound, SessionError>, file: String, active: bool) -> Transition {
        match result {
            Ok(out) => Transition {
                outbound: vec![out],
                events: vec![SessionEvent::ExpressionRequested { file, active }],
                ..Default::default()
            },
            Err(SessionError::NotReady(state)) => {
                tracing::debug!("Dropping request for {} while {}", file, state);
                Transition::event(SessionEvent::CommandRejected { state })
            }
        }
    }

    fn authentication_request(&mut self, token: &Token) -> Outbound {
        self.issue(Request::Authentication(AuthenticationData {
            plugin: self.identity.clone(),
            authentication_token: token.as_str().to_string(),
        }))
    }

    fn issue(&mut self, request: Request) -> Outbound {
        let request_id = format!("{}-{}", request.id_prefix(), self.next_id);
        self.next_id += 1;

        if let Some(expected) = request.message_type().response_type() {
            self.pending.insert(request_id.clone(), expected);
        }
        Outbound { request_id, request }
    }

    fn retire(&mut self, request_id: &str, response: &Response) {
        match self.pending.remove(request_id) {
            Some(expected) => {
                let got = response.message_type();
                if got != Some(expected) && got != Some(MessageType::ApiError) {
                    tracing::warn!("Request {} expected {} but got {}", request_id, expected, response.type_name());
                }
            }
            None if !request_id.is_empty() => {
                tracing::debug!("Uncorrelated {} for request {}", response.type_name(), request_id);
            }
            None => {}
        }
    }

    fn ensure_ready(&self) -> Result<(), SessionError> {
        if self.state == SessionState::Ready {
            Ok(())
        } else {
            Err(SessionError::NotReady(self.state))
        }
    }

    fn enter(&mut self, state: SessionState) {
        if self.state != state {
            tracing::info!("Session {} -> {}", self.state, state);
            self.state = state;
        }
    }
}
