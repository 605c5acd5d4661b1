//! Route guard: decides whether a page may render for the current session.
//!
//! `decide` is the pure decision. `RouteGuard` wraps it for a mounted page: it re-evaluates on
//! every session change and drives a `Navigator` when the page has to be left.

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use crate::{
    models::{GuardDecision, Role, Session},
    session::{SessionStore, Subscription},
};

/// Where unauthenticated visitors are sent.
pub const LOGIN_PATH: &str = "/auth/login";

/// Home page of each role. A user who opens a page meant for another role lands on their own
/// entry here.
pub const ROLE_DASHBOARDS: [(Role, &str); 3] = [
    (Role::Pharmacy, "/pharmacy/dashboard"),
    (Role::Pharmacist, "/pharmacist/dashboard"),
    (Role::Admin, "/admin/dashboard"),
];

/// Dashboard for `role`, or the login page if the table has no entry for it.
pub fn dashboard_path(role: Role) -> &'static str {
    ROLE_DASHBOARDS
        .iter()
        .find(|(entry, _)| *entry == role)
        .map_or(LOGIN_PATH, |(_, path)| *path)
}

/// Role a dashboard path is reserved for. Paths outside the table carry no requirement.
pub fn required_role_for(path: &str) -> Option<Role> {
    ROLE_DASHBOARDS
        .iter()
        .find(|(_, entry)| *entry == path)
        .map(|(role, _)| *role)
}

/// decide
///
/// Evaluates `session` against a page that optionally requires `required`.
///
/// * still loading: `Wait`, whatever the rest of the session says.
/// * not authenticated: redirect to `LOGIN_PATH`.
/// * role differs from `required`: redirect to the user's *own* dashboard.
/// * otherwise: `Render`.
///
/// An authenticated session without a user cannot be placed and is sent to the login page.
pub fn decide(session: &Session, required: Option<Role>) -> GuardDecision {
    if session.is_loading {
        return GuardDecision::Wait;
    }

    let user = match (&session.user, session.authenticated) {
        (Some(user), true) => user,
        _ => return redirect(LOGIN_PATH),
    };

    match required {
        Some(role) if role != user.role => redirect(dashboard_path(user.role)),
        _ => GuardDecision::Render,
    }
}

fn redirect(target: &str) -> GuardDecision {
    GuardDecision::Redirect {
        target: target.to_string(),
    }
}

/// Navigator
///
/// Performs redirects on behalf of the guard. Fire-and-forget.
pub trait Navigator: Send + Sync {
    fn redirect(&self, path: &str);
}

/// ShellView
///
/// What the page shell should show for a guard decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellView {
    /// Neutral loading indicator.
    Loading,
    /// Nothing; a redirect is under way.
    Hidden,
    /// The page's children.
    Content,
}

impl From<&GuardDecision> for ShellView {
    fn from(decision: &GuardDecision) -> Self {
        match decision {
            GuardDecision::Wait => ShellView::Loading,
            GuardDecision::Redirect { .. } => ShellView::Hidden,
            GuardDecision::Render => ShellView::Content,
        }
    }
}

struct GuardShared {
    required: Mutex<Option<Role>>,
    navigator: Arc<dyn Navigator>,
    mounted: AtomicBool,
    last: Mutex<Option<GuardDecision>>,
}

impl GuardShared {
    fn evaluate(&self, session: &Session) -> GuardDecision {
        let required = *self.required.lock().unwrap_or_else(PoisonError::into_inner);
        let decision = decide(session, required);

        let changed = {
            let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
            let changed = last.as_ref() != Some(&decision);
            *last = Some(decision.clone());
            changed
        };

        // Navigate only on the transition into a redirect, never again for the same cause.
        if changed {
            if let GuardDecision::Redirect { target } = &decision {
                if self.mounted.load(Ordering::Acquire) {
                    tracing::debug!(%target, ?required, "route guard redirecting");
                    self.navigator.redirect(target);
                } else {
                    tracing::debug!(%target, "redirect suppressed for unmounted page");
                }
            }
        }

        decision
    }
}

/// RouteGuard
///
/// Guard instance for one mounted page. It subscribes to the session store on `mount` and
/// stops reacting on `unmount` or drop; redirects computed after that are dropped.
pub struct RouteGuard {
    shared: Arc<GuardShared>,
    store: SessionStore,
    subscription: Option<Subscription>,
}

impl RouteGuard {
    /// Mounts a guard for a page requiring `required` and evaluates the current session.
    pub fn mount(
        store: &SessionStore,
        required: Option<Role>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let shared = Arc::new(GuardShared {
            required: Mutex::new(required),
            navigator,
            mounted: AtomicBool::new(true),
            last: Mutex::new(None),
        });

        let listener = Arc::clone(&shared);
        let subscription = store.subscribe(move |session| {
            listener.evaluate(session);
        });

        // Subscribed first so a change racing with mount is not missed.
        shared.evaluate(&store.read());

        Self {
            shared,
            store: store.clone(),
            subscription: Some(subscription),
        }
    }

    /// Re-evaluates the current session. Repeated calls on an unchanged session return the
    /// same decision and navigate at most once.
    pub fn evaluate(&self) -> GuardDecision {
        self.shared.evaluate(&self.store.read())
    }

    /// Changes the page's requirement and re-evaluates.
    pub fn set_required(&self, required: Option<Role>) -> GuardDecision {
        *self
            .shared
            .required
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = required;
        self.evaluate()
    }

    /// Most recent decision.
    pub fn decision(&self) -> GuardDecision {
        self.shared
            .last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or(GuardDecision::Wait)
    }

    pub fn view(&self) -> ShellView {
        ShellView::from(&self.decision())
    }

    /// Whether the page shell may render its children.
    pub fn may_render(&self) -> bool {
        self.view() == ShellView::Content
    }

    pub fn is_mounted(&self) -> bool {
        self.shared.mounted.load(Ordering::Acquire)
    }

    /// Detaches the guard from the store.
    pub fn unmount(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        self.shared.mounted.store(false, Ordering::Release);
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
        }
    }
}

impl Drop for RouteGuard {
    fn drop(&mut self) {
        self.detach();
    }
}
