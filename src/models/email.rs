use lettre::message::header::{Header, HeaderName, HeaderValue};
use lettre::message::{Mailbox, Message, MultiPart, SinglePart};
use lettre::Address;
use regex::Regex;
use std::sync::OnceLock;

use crate::errors::{CommsError, Result};
use crate::models::ticket::Ticket;
use crate::template::{TemplateRenderer, TemplateValues};

/// Statuses that are worth calling out in an incident subject line.
const NOTIFY_STATUSES: [&str; 3] = ["Resolved", "Closed", "Reopened"];

fn address_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    // Same grammar as the HTML5 `<input type="email">` element.
    REGEX.get_or_init(|| {
        Regex::new(
            r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
        )
        .expect("address pattern is valid")
    })
}

/// Syntax check only; nothing is looked up.
pub fn verify_address(address: &str) -> bool {
    address_regex().is_match(address)
}

/// Splits addresses into (valid, rejected), keeping input order.
pub fn partition_addresses<I, S>(addresses: I) -> (Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    addresses
        .into_iter()
        .map(Into::into)
        .partition(|address| verify_address(address))
}

/// Subject line derived from the ticket when the caller gives none.
///
/// Incidents read `[<status>] <priority> Incident <summary>`, with the status
/// bracket only for Resolved, Closed or Reopened. Anything else reads
/// `[Advisory] <summary>`.
pub fn default_subject(ticket: &Ticket) -> String {
    let (status_part, incident_part) = match ticket.incident() {
        Some(incident) => {
            let status = ticket.status();
            let bracket = NOTIFY_STATUSES
                .contains(&status)
                .then(|| format!("[{}]", status));
            (bracket, Some(format!("{} Incident", incident.priority)))
        }
        None => (Some("[Advisory]".to_string()), None),
    };

    [status_part, incident_part, ticket.summary().map(str::to_string)]
        .into_iter()
        .flatten()
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Makes Outlook open the message as an unsent draft.
#[derive(Debug, Clone, Copy)]
struct Unsent;

impl Header for Unsent {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("X-Unsent")
    }

    fn parse(_s: &str) -> std::result::Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(Unsent)
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), "1".to_string())
    }
}

/// Bcc written as a plain address list. lettre's typed `Bcc` re-parses each
/// address with a stricter local-part grammar than `verify_address`.
#[derive(Debug, Clone)]
struct BlindCopy(String);

impl Header for BlindCopy {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("Bcc")
    }

    fn parse(s: &str) -> std::result::Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        Ok(BlindCopy(s.to_string()))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct DraftHeaders {
    from: String,
    to: String,
    bcc: Vec<String>,
    subject: String,
}

/// A comms email being put together for one ticket.
///
/// The draft keeps its own copy of everything it renders, so later refreshes
/// of the ticket do not change it.
#[derive(Debug, Clone)]
pub struct EmailDraft {
    sender: String,
    recipients: Vec<String>,
    rejected_recipients: Vec<String>,
    subject: String,
    body_parts: Vec<SinglePart>,
    headers: Option<DraftHeaders>,
    is_draft: bool,
}

impl EmailDraft {
    pub fn create<I, S>(
        ticket: &Ticket,
        sender: impl Into<String>,
        recipients: I,
        subject: Option<String>,
        is_draft: bool,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (recipients, rejected_recipients) = partition_addresses(recipients);
        if !rejected_recipients.is_empty() {
            tracing::warn!(
                rejected = ?rejected_recipients,
                "rejected invalid recipient addresses for {}",
                ticket.reference()
            );
        }

        Self {
            sender: sender.into(),
            recipients,
            rejected_recipients,
            subject: subject.unwrap_or_else(|| default_subject(ticket)),
            body_parts: Vec::new(),
            headers: None,
            is_draft,
        }
    }

    pub fn add_recipient(&mut self, recipient: impl Into<String>) {
        let recipient = recipient.into();
        if verify_address(&recipient) {
            self.recipients.push(recipient);
        } else {
            self.rejected_recipients.push(recipient);
        }
    }

    pub fn add_recipients<I, S>(&mut self, recipients: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for recipient in recipients {
            self.add_recipient(recipient);
        }
    }

    /// Renders the body and fixes the headers.
    ///
    /// From and To are both the sender; recipients only ever go in Bcc.
    pub fn populate(&mut self, ticket: &Ticket, template: &dyn TemplateRenderer) -> Result<()> {
        let html = template.render(&TemplateValues {
            reference: ticket.reference(),
            summary: ticket.summary().unwrap_or(""),
            description: ticket.description().unwrap_or(""),
        })?;

        self.body_parts.push(SinglePart::html(html));
        self.headers = Some(DraftHeaders {
            from: self.sender.clone(),
            to: self.sender.clone(),
            bcc: self.recipients.clone(),
            subject: self.subject.clone(),
        });

        Ok(())
    }

    /// Formats the draft as an RFC 5322 message, ready to save as `.eml`.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let headers = self.headers.as_ref().ok_or_else(|| {
            CommsError::Compose("Email has not been populated from a ticket yet".to_string())
        })?;

        let mut builder = Message::builder()
            .from(mailbox(&headers.from)?)
            .to(mailbox(&headers.to)?)
            .subject(headers.subject.clone())
            .header(BlindCopy(headers.bcc.join(", ")))
            .keep_bcc();
        if self.is_draft {
            builder = builder.header(Unsent);
        }

        let mut parts = self.body_parts.iter().cloned();
        let first = parts
            .next()
            .ok_or_else(|| CommsError::Compose("Email has no body".to_string()))?;
        let body = parts.fold(MultiPart::alternative().singlepart(first), |multipart, part| {
            multipart.singlepart(part)
        });

        let message = builder
            .multipart(body)
            .map_err(|e| CommsError::Compose(format!("Failed to assemble message: {}", e)))?;

        Ok(message.formatted())
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn recipients(&self) -> &[String] {
        &self.recipients
    }

    pub fn rejected_recipients(&self) -> &[String] {
        &self.rejected_recipients
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body_parts(&self) -> &[SinglePart] {
        &self.body_parts
    }

    pub fn is_draft(&self) -> bool {
        self.is_draft
    }
}

fn mailbox(address: &str) -> Result<Mailbox> {
    let parsed: Address = address
        .parse()
        .map_err(|e| CommsError::Compose(format!("Invalid address '{}': {}", address, e)))?;
    Ok(Mailbox::new(None, parsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ticket::tests::{generic_record, incident_record, ticket_from};
    use crate::template::EmailTemplate;

    const SENDER: &str = "ops@example.com";

    fn template() -> EmailTemplate {
        EmailTemplate::new("<p>{{ ref }}</p><p>{{ summary }}</p><p>{{ desc }}</p>")
    }

    fn header_lines(text: &str) -> Vec<&str> {
        text.lines()
            .filter(|line| {
                ["From:", "To:", "Bcc:", "Subject:"]
                    .iter()
                    .any(|name| line.starts_with(name))
            })
            .collect()
    }

    #[test]
    fn test_verify_address() {
        assert!(verify_address("user@example.com"));
        assert!(verify_address("a.b+c@sub.example.co"));
        assert!(verify_address("ops_team!@localhost"));
        assert!(!verify_address("user@-bad-.com"));
        assert!(!verify_address("not-an-email"));
        assert!(!verify_address("user@exa mple.com"));
        assert!(!verify_address("@example.com"));
        assert!(!verify_address(""));
    }

    #[test]
    fn test_host_label_length_limit() {
        let ok = format!("user@{}.com", "a".repeat(63));
        let too_long = format!("user@{}.com", "a".repeat(64));
        assert!(verify_address(&ok));
        assert!(!verify_address(&too_long));
    }

    #[test]
    fn test_partition_is_total_and_ordered() {
        let input = vec![
            "first@example.com",
            "not-an-email",
            "second@example.com",
            "user@-bad-.com",
            "first@example.com",
        ];
        let (valid, rejected) = partition_addresses(input.clone());

        assert_eq!(valid.len() + rejected.len(), input.len());
        assert_eq!(
            valid,
            vec!["first@example.com", "second@example.com", "first@example.com"]
        );
        assert_eq!(rejected, vec!["not-an-email", "user@-bad-.com"]);
    }

    #[test]
    fn test_create_partitions_recipients() {
        let ticket = ticket_from(&generic_record("WEB-42", "Network outage"));
        let draft = EmailDraft::create(
            &ticket,
            SENDER,
            vec!["team@example.com", "oops", "boss@example.org"],
            None,
            true,
        );

        assert_eq!(draft.recipients(), ["team@example.com", "boss@example.org"]);
        assert_eq!(draft.rejected_recipients(), ["oops"]);
        assert_eq!(draft.sender(), SENDER);
        assert!(draft.is_draft());
        assert!(draft.body_parts().is_empty());
    }

    #[test]
    fn test_create_without_recipients() {
        let ticket = ticket_from(&generic_record("WEB-42", "Network outage"));
        let draft = EmailDraft::create(&ticket, SENDER, Vec::<String>::new(), None, true);
        assert!(draft.recipients().is_empty());
        assert!(draft.rejected_recipients().is_empty());
    }

    #[test]
    fn test_add_recipients_after_create() {
        let ticket = ticket_from(&generic_record("WEB-42", "Network outage"));
        let mut draft = EmailDraft::create(&ticket, SENDER, vec!["a@example.com"], None, true);

        draft.add_recipient("b@example.com");
        draft.add_recipients(vec!["bad address", "c@example.com"]);

        assert_eq!(draft.recipients(), ["a@example.com", "b@example.com", "c@example.com"]);
        assert_eq!(draft.rejected_recipients(), ["bad address"]);
    }

    #[test]
    fn test_advisory_subject() {
        let ticket = ticket_from(&generic_record("WEB-42", "Network outage"));
        assert_eq!(default_subject(&ticket), "[Advisory] Network outage");
    }

    #[test]
    fn test_open_incident_subject_has_no_status() {
        let ticket = ticket_from(&incident_record("Open", "P1", "DB failure"));
        assert_eq!(default_subject(&ticket), "P1 Incident DB failure");
    }

    #[test]
    fn test_resolved_incident_subject() {
        let ticket = ticket_from(&incident_record("Resolved", "P2", "Fixed"));
        assert_eq!(default_subject(&ticket), "[Resolved] P2 Incident Fixed");

        let ticket = ticket_from(&incident_record("Reopened", "P3", "Back again"));
        assert_eq!(default_subject(&ticket), "[Reopened] P3 Incident Back again");
    }

    #[test]
    fn test_subject_without_summary_has_no_null_token() {
        let mut record = generic_record("WEB-42", "ignored");
        record["fields"]["summary"] = serde_json::Value::Null;
        let ticket = ticket_from(&record);

        let subject = default_subject(&ticket);
        assert_eq!(subject, "[Advisory]");
        assert!(!subject.contains("None"));
        assert!(!subject.contains("null"));
    }

    #[test]
    fn test_explicit_subject_wins() {
        let ticket = ticket_from(&incident_record("Open", "P1", "DB failure"));
        let draft = EmailDraft::create(
            &ticket,
            SENDER,
            vec!["team@example.com"],
            Some("Heads up".to_string()),
            true,
        );
        assert_eq!(draft.subject(), "Heads up");
    }

    #[test]
    fn test_populate_renders_one_html_part() {
        let ticket = ticket_from(&incident_record("Open", "P1", "DB failure"));
        let mut draft = EmailDraft::create(&ticket, SENDER, vec!["team@example.com"], None, true);

        draft.populate(&ticket, &template()).unwrap();

        assert_eq!(draft.body_parts().len(), 1);
        let text = String::from_utf8(draft.serialize().unwrap()).unwrap();
        assert!(text.contains("text/html"));
        assert!(text.contains("<p>OPS-260857</p>"));
        assert!(text.contains("<p>Primary database unavailable.</p>"));
    }

    #[test]
    fn test_populate_propagates_template_error() {
        let ticket = ticket_from(&generic_record("WEB-42", "Network outage"));
        let mut draft = EmailDraft::create(&ticket, SENDER, vec!["team@example.com"], None, true);

        let err = draft
            .populate(&ticket, &EmailTemplate::new("{{ nope }}"))
            .unwrap_err();
        assert!(matches!(err, CommsError::Template(_)));
        assert!(draft.body_parts().is_empty());
    }

    #[test]
    fn test_serialize_headers() {
        let ticket = ticket_from(&generic_record("WEB-42", "Network outage"));
        let mut draft = EmailDraft::create(
            &ticket,
            SENDER,
            vec!["a@example.com", "b@example.com"],
            None,
            true,
        );
        draft.populate(&ticket, &template()).unwrap();

        let text = String::from_utf8(draft.serialize().unwrap()).unwrap();

        assert!(text.contains("From: ops@example.com"));
        assert!(text.contains("To: ops@example.com"));
        assert!(text.contains("Bcc: a@example.com, b@example.com"));
        assert!(text.contains("Subject: [Advisory] Network outage"));
        assert!(text.contains("multipart/alternative"));
    }

    #[test]
    fn test_serialize_keeps_every_accepted_address() {
        let ticket = ticket_from(&generic_record("WEB-42", "Network outage"));
        let addresses = vec![
            ".lead@example.com",
            "a..b@example.com",
            "x{y}@example.com",
            "ops_team!@localhost",
            "A@EXAMPLE.COM",
        ];
        let mut draft = EmailDraft::create(&ticket, SENDER, addresses.clone(), None, true);
        assert_eq!(draft.recipients(), addresses.as_slice());

        draft.populate(&ticket, &template()).unwrap();
        let text = String::from_utf8(draft.serialize().unwrap()).unwrap();

        for address in addresses {
            assert!(text.contains(address), "{} missing from Bcc", address);
        }
    }

    #[test]
    fn test_empty_bcc_header_without_recipients() {
        let ticket = ticket_from(&generic_record("WEB-42", "Network outage"));
        let mut draft = EmailDraft::create(&ticket, SENDER, vec!["not-an-email"], None, true);
        draft.populate(&ticket, &template()).unwrap();

        let text = String::from_utf8(draft.serialize().unwrap()).unwrap();
        let bcc: Vec<&str> = text.lines().filter(|line| line.starts_with("Bcc:")).collect();
        assert_eq!(bcc.len(), 1);
        assert_eq!(bcc[0].trim_end(), "Bcc:");
        assert!(!text.contains("not-an-email"));
        assert!(text.contains("To: ops@example.com"));
    }

    #[test]
    fn test_unsent_marker_follows_draft_flag() {
        let ticket = ticket_from(&incident_record("Resolved", "P2", "Fixed"));
        let recipients = vec!["a@example.com", "b@example.com"];

        let mut draft = EmailDraft::create(&ticket, SENDER, recipients.clone(), None, true);
        draft.populate(&ticket, &template()).unwrap();
        let mut final_copy = EmailDraft::create(&ticket, SENDER, recipients, None, false);
        final_copy.populate(&ticket, &template()).unwrap();

        let draft_text = String::from_utf8(draft.serialize().unwrap()).unwrap();
        let final_text = String::from_utf8(final_copy.serialize().unwrap()).unwrap();

        assert!(draft_text.contains("X-Unsent: 1"));
        assert!(!final_text.contains("X-Unsent"));
        assert_eq!(header_lines(&draft_text), header_lines(&final_text));
        assert_eq!(header_lines(&draft_text).len(), 4);
    }

    #[test]
    fn test_serialize_before_populate_fails() {
        let ticket = ticket_from(&generic_record("WEB-42", "Network outage"));
        let draft = EmailDraft::create(&ticket, SENDER, vec!["a@example.com"], None, true);
        assert!(matches!(draft.serialize(), Err(CommsError::Compose(_))));
    }
}
