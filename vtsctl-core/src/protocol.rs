//! VTube Studio Public API message types
//!
//! Every frame is a JSON envelope:
//! `{apiName, apiVersion, requestID, messageType, data}`.
//! Outbound requests are built from [`Request`]; inbound frames are decoded
//! once into [`Response`] so nothing downstream touches raw JSON.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol identifier sent in every envelope
pub const API_NAME: &str = "VTubeStudioPublicAPI";

/// Protocol version sent in every envelope
pub const API_VERSION: &str = "1.0";

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("Invalid {message_type} payload: {source}")]
    InvalidPayload {
        message_type: MessageType,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode {0}")]
    Encode(MessageType, #[source] serde_json::Error),
}

/// Message type tags understood by this client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    AuthenticationTokenRequest,
    AuthenticationTokenResponse,
    AuthenticationRequest,
    AuthenticationResponse,
    ExpressionStateRequest,
    ExpressionStateResponse,
    ExpressionActivationRequest,
    ExpressionActivationResponse,
    ApiError,
}

impl MessageType {
    const ALL: [MessageType; 9] = [
        MessageType::AuthenticationTokenRequest,
        MessageType::AuthenticationTokenResponse,
        MessageType::AuthenticationRequest,
        MessageType::AuthenticationResponse,
        MessageType::ExpressionStateRequest,
        MessageType::ExpressionStateResponse,
        MessageType::ExpressionActivationRequest,
        MessageType::ExpressionActivationResponse,
        MessageType::ApiError,
    ];

    /// Wire name of the tag
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::AuthenticationTokenRequest => "AuthenticationTokenRequest",
            MessageType::AuthenticationTokenResponse => "AuthenticationTokenResponse",
            MessageType::AuthenticationRequest => "AuthenticationRequest",
            MessageType::AuthenticationResponse => "AuthenticationResponse",
            MessageType::ExpressionStateRequest => "ExpressionStateRequest",
            MessageType::ExpressionStateResponse => "ExpressionStateResponse",
            MessageType::ExpressionActivationRequest => "ExpressionActivationRequest",
            MessageType::ExpressionActivationResponse => "ExpressionActivationResponse",
            MessageType::ApiError => "APIError",
        }
    }

    /// Look up a tag by its wire name
    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    /// Response tag expected for a request tag
    pub fn response_type(self) -> Option<Self> {
        match self {
            MessageType::AuthenticationTokenRequest => Some(MessageType::AuthenticationTokenResponse),
            MessageType::AuthenticationRequest => Some(MessageType::AuthenticationResponse),
            MessageType::ExpressionStateRequest => Some(MessageType::ExpressionStateResponse),
            MessageType::ExpressionActivationRequest => Some(MessageType::ExpressionActivationResponse),
            _ => None,
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw wire envelope, shared by both directions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub api_name: String,
    pub api_version: String,
    #[serde(rename = "requestID", default)]
    pub request_id: String,
    pub message_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Plugin identity presented during the token and authentication requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginIdentity {
    pub plugin_name: String,
    pub plugin_developer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationData {
    #[serde(flatten)]
    pub plugin: PluginIdentity,
    pub authentication_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionStateQuery {
    pub details: bool,
    /// Empty string asks for every expression of the loaded model
    pub expression_file: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionActivation {
    pub expression_file: String,
    pub active: bool,
    pub disable_others: bool,
}

/// Requests this client sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    AuthenticationToken(PluginIdentity),
    Authentication(AuthenticationData),
    ExpressionState(ExpressionStateQuery),
    ExpressionActivation(ExpressionActivation),
}

impl Request {
    pub fn message_type(&self) -> MessageType {
        match self {
            Request::AuthenticationToken(_) => MessageType::AuthenticationTokenRequest,
            Request::Authentication(_) => MessageType::AuthenticationRequest,
            Request::ExpressionState(_) => MessageType::ExpressionStateRequest,
            Request::ExpressionActivation(_) => MessageType::ExpressionActivationRequest,
        }
    }

    /// Prefix used when the session assigns a request ID
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Request::AuthenticationToken(_) => "token_request",
            Request::Authentication(_) => "auth",
            Request::ExpressionState(_) => "list_expressions",
            Request::ExpressionActivation(_) => "activate_expression",
        }
    }

    fn data(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Request::AuthenticationToken(d) => serde_json::to_value(d),
            Request::Authentication(d) => serde_json::to_value(d),
            Request::ExpressionState(d) => serde_json::to_value(d),
            Request::ExpressionActivation(d) => serde_json::to_value(d),
        }
    }
}

/// A request paired with the ID it goes out under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub request_id: String,
    pub request: Request,
}

impl Outbound {
    pub fn envelope(&self) -> Result<Envelope, ProtocolError> {
        let message_type = self.request.message_type();
        let data = self
            .request
            .data()
            .map_err(|e| ProtocolError::Encode(message_type, e))?;

        Ok(Envelope {
            api_name: API_NAME.to_string(),
            api_version: API_VERSION.to_string(),
            request_id: self.request_id.clone(),
            message_type: message_type.as_str().to_string(),
            data,
        })
    }

    /// Serialize to the JSON text frame sent on the wire
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        let envelope = self.envelope()?;
        serde_json::to_string(&envelope).map_err(|e| ProtocolError::Encode(self.request.message_type(), e))
    }
}

/// One expression as reported by discovery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpressionEntry {
    #[serde(default)]
    pub name: String,
    pub file: String,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionStateData {
    #[serde(default)]
    pub model_loaded: bool,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub expressions: Vec<ExpressionEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenData {
    authentication_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
struct AuthenticationResult {
    authenticated: bool,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
struct ApiErrorData {
    #[serde(rename = "errorID", default)]
    error_id: i64,
    #[serde(default)]
    message: String,
}

/// Inbound messages, one variant per message type this client handles
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    AuthenticationToken { token: String },
    Authentication { authenticated: bool, reason: Option<String> },
    ExpressionState(ExpressionStateData),
    ExpressionActivation,
    ApiError { error_id: i64, message: String },
    /// Well-formed envelope with a tag this client does not act on
    Other { message_type: String },
}

impl Response {
    pub fn message_type(&self) -> Option<MessageType> {
        match self {
            Response::AuthenticationToken { .. } => Some(MessageType::AuthenticationTokenResponse),
            Response::Authentication { .. } => Some(MessageType::AuthenticationResponse),
            Response::ExpressionState(_) => Some(MessageType::ExpressionStateResponse),
            Response::ExpressionActivation => Some(MessageType::ExpressionActivationResponse),
            Response::ApiError { .. } => Some(MessageType::ApiError),
            Response::Other { .. } => None,
        }
    }

    /// Tag as received, for reporting
    pub fn type_name(&self) -> &str {
        match self {
            Response::Other { message_type } => message_type,
            known => known.message_type().map(MessageType::as_str).unwrap_or_default(),
        }
    }
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub request_id: String,
    pub response: Response,
}

impl Inbound {
    /// Decode a text frame
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
        Self::from_envelope(envelope)
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Self, ProtocolError> {
        let Envelope {
            request_id,
            message_type,
            data,
            ..
        } = envelope;

        let Some(tag) = MessageType::from_wire(&message_type) else {
            return Ok(Self {
                request_id,
                response: Response::Other { message_type },
            });
        };

        let invalid = |source| ProtocolError::InvalidPayload {
            message_type: tag,
            source,
        };

        let response = match tag {
            MessageType::AuthenticationTokenResponse => {
                let d: TokenData = serde_json::from_value(data).map_err(invalid)?;
                Response::AuthenticationToken {
                    token: d.authentication_token,
                }
            }
            MessageType::AuthenticationResponse => {
                // No payload means no grant
                let d: AuthenticationResult = if data.is_null() {
                    AuthenticationResult::default()
                } else {
                    serde_json::from_value(data).map_err(invalid)?
                };
                Response::Authentication {
                    authenticated: d.authenticated,
                    reason: d.reason,
                }
            }
            MessageType::ExpressionStateResponse => {
                // Some API versions omit `data` when no model is loaded
                if data.is_null() {
                    Response::ExpressionState(ExpressionStateData::default())
                } else {
                    Response::ExpressionState(serde_json::from_value(data).map_err(invalid)?)
                }
            }
            MessageType::ExpressionActivationResponse => Response::ExpressionActivation,
            MessageType::ApiError => {
                let d: ApiErrorData = if data.is_null() {
                    ApiErrorData::default()
                } else {
                    serde_json::from_value(data).map_err(invalid)?
                };
                Response::ApiError {
                    error_id: d.error_id,
                    message: d.message,
                }
            }
            // Request tags echoed back are not something we act on
            _ => Response::Other { message_type },
        };

        Ok(Self { request_id, response })
    }
}
