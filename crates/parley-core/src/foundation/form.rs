//! Outbound dispatch forms.
//!
//! A [`DispatchForm`] describes one message to send: body, attachments and
//! targeting. Anything that converts into a form (a `&str`, a `String`, a
//! [`DispatchBody`] or a shared [`Renderable`]) may be passed wherever a form
//! is expected, and becomes `{ body: value }`.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::foundation::platform::Platform;

// ============================================================================
// Body
// ============================================================================

/// A body that renders itself differently per platform.
///
/// Templating engines implement this; the core only calls [`render`](Self::render).
pub trait Renderable: Send + Sync + fmt::Debug {
    /// Produces the platform-native text.
    fn render(&self, platform: Platform) -> String;
}

/// The text part of a dispatch.
#[derive(Debug, Clone)]
pub enum DispatchBody {
    /// Already final text.
    Text(String),
    /// A template rendered at send time.
    Renderable(Arc<dyn Renderable>),
}

impl DispatchBody {
    /// Produces the text to send on `platform`.
    pub fn render(&self, platform: Platform) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Renderable(renderable) => renderable.render(platform),
        }
    }

    /// Returns `true` for an empty plain-text body.
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Text(text) if text.is_empty())
    }
}

impl From<&str> for DispatchBody {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for DispatchBody {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Arc<dyn Renderable>> for DispatchBody {
    fn from(renderable: Arc<dyn Renderable>) -> Self {
        Self::Renderable(renderable)
    }
}

// ============================================================================
// Attachments
// ============================================================================

/// Where attachment bytes come from.
#[derive(Debug, Clone)]
pub enum AttachmentSource {
    /// In-memory bytes.
    Bytes(Arc<[u8]>),
    /// A file read when the message is sent.
    File(PathBuf),
}

/// A named binary attachment.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// File name shown by the platform.
    pub name: String,
    /// Content.
    pub source: AttachmentSource,
}

impl Attachment {
    /// Creates an attachment from in-memory bytes.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            source: AttachmentSource::Bytes(bytes.into()),
        }
    }

    /// Creates an attachment read from `path` at send time.
    pub fn from_file(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: AttachmentSource::File(path.into()),
        }
    }

    /// Reads the attachment content.
    pub async fn load(&self) -> std::io::Result<Vec<u8>> {
        match &self.source {
            AttachmentSource::Bytes(bytes) => Ok(bytes.to_vec()),
            AttachmentSource::File(path) => tokio::fs::read(path).await,
        }
    }
}

// ============================================================================
// Form
// ============================================================================

/// A message to dispatch.
#[derive(Debug, Clone, Default)]
pub struct DispatchForm {
    /// Text or template.
    pub body: Option<DispatchBody>,
    /// Files to upload alongside the body.
    pub attachments: Vec<Attachment>,
    /// Send the rendered body as plain text even where richer output exists.
    pub force_as_text: bool,
    /// Target thread.
    pub thread: Option<String>,
    /// Message to reply to.
    pub reply_to: Option<String>,
}

impl DispatchForm {
    /// Creates an empty form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the body.
    pub fn body(mut self, body: impl Into<DispatchBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Adds an attachment.
    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Sets the target thread.
    pub fn thread(mut self, thread: impl Into<String>) -> Self {
        self.thread = Some(thread.into());
        self
    }

    /// Sets the message to reply to.
    pub fn reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.reply_to = Some(message_id.into());
        self
    }

    /// Requests plain-text output.
    pub fn force_as_text(mut self, force: bool) -> Self {
        self.force_as_text = force;
        self
    }

    /// Returns `true` if there is a non-empty body or at least one attachment.
    pub fn has_content(&self) -> bool {
        self.body.as_ref().is_some_and(|body| !body.is_blank()) || !self.attachments.is_empty()
    }

    /// Renders the body for `platform`, if any.
    pub fn render_body(&self, platform: Platform) -> Option<String> {
        self.body.as_ref().map(|body| body.render(platform))
    }
}

impl From<DispatchBody> for DispatchForm {
    fn from(body: DispatchBody) -> Self {
        Self::new().body(body)
    }
}

impl From<&str> for DispatchForm {
    fn from(text: &str) -> Self {
        Self::new().body(text)
    }
}

impl From<String> for DispatchForm {
    fn from(text: String) -> Self {
        Self::new().body(text)
    }
}

impl From<Arc<dyn Renderable>> for DispatchForm {
    fn from(renderable: Arc<dyn Renderable>) -> Self {
        Self::new().body(renderable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Greeting;

    impl Renderable for Greeting {
        fn render(&self, platform: Platform) -> String {
            match platform {
                Platform::Discord => "**hello**".into(),
                _ => "hello".into(),
            }
        }
    }

    #[test]
    fn test_bare_values_become_body() {
        let form: DispatchForm = "hi".into();
        assert_eq!(form.render_body(Platform::Facebook).as_deref(), Some("hi"));
        assert!(form.thread.is_none());

        let renderable: Arc<dyn Renderable> = Arc::new(Greeting);
        let form = DispatchForm::from(renderable);
        assert_eq!(form.render_body(Platform::Discord).as_deref(), Some("**hello**"));
        assert_eq!(form.render_body(Platform::Facebook).as_deref(), Some("hello"));
    }

    #[test]
    fn test_has_content() {
        assert!(!DispatchForm::new().has_content());
        assert!(!DispatchForm::from("").has_content());
        assert!(DispatchForm::from("x").has_content());
        assert!(
            DispatchForm::new()
                .attachment(Attachment::from_bytes("a.txt", b"abc".to_vec()))
                .has_content()
        );
    }

    #[tokio::test]
    async fn test_attachment_load_bytes() {
        let attachment = Attachment::from_bytes("a.bin", vec![1u8, 2, 3]);
        assert_eq!(attachment.load().await.unwrap(), vec![1, 2, 3]);
    }
}
