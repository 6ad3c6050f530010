//! Operator-facing output

use std::io::Write;

use vtsctl_core::{ExpressionCatalog, SessionEvent};

use crate::driver::EventSink;

/// Prints session events as plain lines
pub struct Console<W: Write> {
    out: W,
}

impl<W: Write> Console<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Print the command menu
    pub fn menu(&mut self, catalog: &ExpressionCatalog) {
        let names: Vec<String> = catalog.names().map(str::to_string).collect();
        let _ = writeln!(self.out, "{}", menu_text(&names));
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> EventSink for Console<W> {
    fn emit(&mut self, event: &SessionEvent) {
        let _ = writeln!(self.out, "{}", describe(event));
        let _ = self.out.flush();
    }
}

fn menu_text(names: &[String]) -> String {
    format!(
        "Expressions: {}\nCommands: reset, list, off <name>, help, quit",
        names.join(", ")
    )
}

/// One-line description of an event
pub fn describe(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Connected => "Connected to VTube Studio".to_string(),
        SessionEvent::TokenRequested => "Requesting a new token, approve the plugin in VTube Studio".to_string(),
        SessionEvent::TokenIssued => "Token received and saved".to_string(),
        SessionEvent::AuthenticationStarted => "Authenticating...".to_string(),
        SessionEvent::Authenticated => "Authenticated".to_string(),
        SessionEvent::AuthenticationRejected { reason } => match reason {
            Some(reason) => format!("Authentication failed: {}", reason),
            None => "Authentication failed".to_string(),
        },
        SessionEvent::ExpressionsListed {
            model_name,
            expressions,
        } => {
            if expressions.is_empty() {
                return "No expressions found in the model".to_string();
            }
            let mut text = match model_name {
                Some(model) => format!("Expressions in {}:", model),
                None => "Expressions in the model:".to_string(),
            };
            for e in expressions {
                text.push_str(&format!("\n - {} (active: {})", e.file, e.active));
            }
            text
        }
        SessionEvent::ExpressionRequested { file, active: true } => format!("Activating {}", file),
        SessionEvent::ExpressionRequested { file, active: false } => format!("Deactivating {}", file),
        SessionEvent::ResetRequested { count } => format!("Deactivating {} expression(s)", count),
        SessionEvent::ActivationConfirmed => "Expression change applied".to_string(),
        SessionEvent::ApiError { error_id, message } => format!("API error {}: {}", error_id, message),
        SessionEvent::Menu { names } => menu_text(names),
        SessionEvent::UnknownExpression { name } => format!("Unknown expression: {}", name),
        SessionEvent::Unrecognized { input } => format!("Unrecognized command: {}", input),
        SessionEvent::CommandRejected { state } => format!("Not ready yet ({}), command ignored", state),
        SessionEvent::Unexpected { message_type, state } => {
            format!("Ignored {} while {}", message_type, state)
        }
        SessionEvent::QuitRequested => "Closing connection".to_string(),
        SessionEvent::Disconnected { reason } => format!("Disconnected: {}", reason),
    }
}
