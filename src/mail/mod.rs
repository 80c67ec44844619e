pub mod mails;
pub mod sendmail;

pub use sendmail::{LogMailer, MailError, Mailer, OutgoingMail, ResendMailer};
