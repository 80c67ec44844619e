use super::sendmail::{render_template, MailError, Mailer, OutgoingMail};

const LOGIN_LINK_TEMPLATE: &str = include_str!("templates/login-link.html");

pub async fn send_login_link_email(
    mailer: &dyn Mailer,
    to_email: &str,
    full_name: &str,
    login_link: &str,
) -> Result<(), MailError> {
    let html = render_template(
        LOGIN_LINK_TEMPLATE,
        &[("full_name", full_name), ("login_link", login_link)],
    );

    mailer
        .send(OutgoingMail {
            to: to_email.to_string(),
            subject: "Your Qrew access link".to_string(),
            html,
        })
        .await
}
