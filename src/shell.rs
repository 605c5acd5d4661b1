//! Page shell: the HTML chrome (sidebar, header, logout control) around guarded pages.
//!
//! Plain markup; the dashboard client replaces it after hydration.

use crate::{
    guard::{LOGIN_PATH, ROLE_DASHBOARDS, ShellView},
    models::{Role, Session},
};

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn document(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{} | PharmaLink</title></head>\n<body>\n{}\n</body>\n</html>\n",
        escape(title),
        body
    )
}

/// Title shown in the header of a role's dashboard.
pub fn dashboard_title(role: Role) -> &'static str {
    match role {
        Role::Pharmacy => "Pharmacy Dashboard",
        Role::Pharmacist => "Pharmacist Dashboard",
        Role::Admin => "Admin Dashboard",
    }
}

/// render
///
/// Renders the shell for a guard view. `Hidden` yields an empty string: the caller is
/// redirecting and must not show anything.
pub fn render(view: ShellView, session: &Session, title: &str, content: &str) -> String {
    match view {
        ShellView::Loading => loading_page(),
        ShellView::Hidden => String::new(),
        ShellView::Content => page(session, title, content),
    }
}

/// The neutral placeholder shown while the session is initializing.
pub fn loading_page() -> String {
    document(
        "Loading",
        "<main class=\"shell-loading\" aria-busy=\"true\"><p>Loading…</p></main>",
    )
}

fn page(session: &Session, title: &str, content: &str) -> String {
    let user = session.user.as_ref();

    let nav: String = ROLE_DASHBOARDS
        .iter()
        .filter(|(role, _)| user.is_some_and(|u| u.role == *role))
        .map(|(role, path)| {
            format!(
                "<li><a href=\"{path}\">{}</a></li>",
                escape(dashboard_title(*role))
            )
        })
        .collect();

    let who = user.map_or_else(String::new, |u| {
        format!(
            "<span class=\"shell-user\">{} ({})</span>",
            escape(&u.email),
            u.role
        )
    });

    let body = format!(
        "<aside class=\"shell-sidebar\"><nav><ul>{nav}</ul></nav></aside>\n\
         <header class=\"shell-header\"><h1>{}</h1>{who}\
         <form method=\"post\" action=\"/auth/logout\"><button type=\"submit\">Log out</button></form></header>\n\
         <main class=\"shell-content\">{content}</main>",
        escape(title)
    );
    document(title, &body)
}

/// The sign-in form. A successful post is answered with a redirect to the dashboard.
pub fn login_page() -> String {
    let body = format!(
        "<main class=\"shell-login\">\n<h1>Sign in</h1>\n\
         <form id=\"login\" method=\"post\" action=\"{LOGIN_PATH}\">\n\
         <label>Email <input type=\"email\" name=\"email\" required></label>\n\
         <label>Password <input type=\"password\" name=\"password\" required></label>\n\
         <button type=\"submit\">Sign in</button>\n</form>\n</main>"
    );
    document("Sign in", &body)
}
