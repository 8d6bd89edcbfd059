use crate::auth::{AuthState, Session, SessionHandle};

/// Top-level screens shown to a signed-in user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Feed,
    CreatePost,
    Profile,
}

pub const TABS: [Tab; 3] = [Tab::Feed, Tab::CreatePost, Tab::Profile];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Render nothing.
    None,
    Auth,
    Tabs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateView {
    /// The first session event has not arrived yet.
    Loading,
    SignedOut,
    SignedIn(Session),
}

impl GateView {
    pub fn route(&self) -> Route {
        match self {
            GateView::Loading => Route::None,
            GateView::SignedOut => Route::Auth,
            GateView::SignedIn(_) => Route::Tabs,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match self {
            GateView::SignedIn(session) => Some(session),
            _ => None,
        }
    }
}

impl From<AuthState> for GateView {
    fn from(state: AuthState) -> Self {
        match state {
            AuthState::Unknown => GateView::Loading,
            AuthState::SignedOut => GateView::SignedOut,
            AuthState::SignedIn(session) => GateView::SignedIn(session),
        }
    }
}

/// Chooses between the sign-in screen and the tabs from the session stream.
///
/// Dropping the gate detaches it from the stream.
#[derive(Debug)]
pub struct SessionGate {
    session: SessionHandle,
    view: GateView,
}

impl SessionGate {
    pub fn mount(mut session: SessionHandle) -> Self {
        let view = GateView::from(session.mark_seen());
        Self { session, view }
    }

    pub fn view(&self) -> &GateView {
        &self.view
    }

    /// Waits for the next session event and re-renders.
    ///
    /// Returns `None` when the identity client is gone.
    pub async fn changed(&mut self) -> Option<&GateView> {
        let state = self.session.changed().await?;
        self.view = GateView::from(state);
        Some(&self.view)
    }
}
