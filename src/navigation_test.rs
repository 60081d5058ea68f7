use super::*;

#[test]
fn sign_in_path_carries_encoded_return_target() {
    let r = Redirect::SignIn { return_to: Some("/admin/projects?page=2".into()) };
    assert_eq!(r.path(), "/login?returnUrl=%2Fadmin%2Fprojects%3Fpage%3D2");
}

#[test]
fn sign_in_without_return_target() {
    assert_eq!(Redirect::SignIn { return_to: None }.path(), "/login");
}

#[test]
fn verification_pending_prefills_email() {
    let r = Redirect::VerificationPending { email: Some("ada+x@example.com".into()) };
    assert_eq!(r.path(), "/verify-email-pending?email=ada%2Bx%40example.com");
}

#[test]
fn home_is_root() {
    assert_eq!(Redirect::Home.to_string(), "/");
}

#[test]
fn tracing_navigator_tracks_current_path() {
    let nav = TracingNavigator::new("/dashboard");
    assert_eq!(nav.current_path(), "/dashboard");
    nav.navigate(Redirect::Home);
    assert_eq!(nav.current_path(), "/");
}
