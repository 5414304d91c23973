use crate::error::Intent;
use serde::Serialize;

pub const DEFAULT_ERROR_BODY: &str = "Please try again if this was not your intention!";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorModal {
    pub header: String,
    pub body: String,
}

impl ErrorModal {
    pub fn rejected(intent: Intent) -> Self {
        Self {
            header: format!("{intent} rejected - no data was sent"),
            body: DEFAULT_ERROR_BODY.to_string(),
        }
    }
}

/// The dismissible error panel. Kept apart from the snapshot so a refresh can
/// never clear an error the player has not seen yet.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ErrorState(Option<ErrorModal>);

impl ErrorState {
    pub fn hidden() -> Self {
        Self(None)
    }

    pub fn showing(modal: ErrorModal) -> Self {
        Self(Some(modal))
    }

    pub fn shown(&self) -> bool {
        self.0.is_some()
    }

    pub fn header(&self) -> &str {
        self.0.as_ref().map_or("", |modal| modal.header.as_str())
    }

    pub fn body(&self) -> &str {
        self.0.as_ref().map_or("", |modal| modal.body.as_str())
    }

    pub fn modal(&self) -> Option<&ErrorModal> {
        self.0.as_ref()
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn rejected__buy_ticket__uses_player_facing_wording() {
        // when
        let modal = ErrorModal::rejected(Intent::BuyTicket);

        // then
        assert_eq!(modal.header, "Buy Ticket rejected - no data was sent");
        assert_eq!(modal.body, DEFAULT_ERROR_BODY);
    }

    #[test]
    fn hidden__exposes_empty_triple() {
        let state = ErrorState::hidden();
        assert!(!state.shown());
        assert_eq!(state.header(), "");
        assert_eq!(state.body(), "");
    }

    #[test]
    fn showing__exposes_modal_fields() {
        let state = ErrorState::showing(ErrorModal::rejected(Intent::SkipBlock));
        assert!(state.shown());
        assert_eq!(state.header(), "Skip Block rejected - no data was sent");
        assert_eq!(state.body(), DEFAULT_ERROR_BODY);
    }
}
