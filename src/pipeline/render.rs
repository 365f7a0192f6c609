//! Message rendering: one transformed record → one multi-part message.
//!
//! The wire layout is
//! `multipart/alternative(text/plain, multipart/related(text/html, images...))`,
//! with each image's content-id equal to its asset tag.

use lettre::Message;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};

use crate::assets::Asset;
use crate::error::{DeliveryError, TemplateError};
use crate::pipeline::PreparedMerge;
use crate::record::Record;
use crate::template::{RenderContext, Resolved};
use crate::transport::parse_address;

/// A fully rendered, self-contained message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub subject: String,
    pub from_display_name: Option<String>,
    pub from_address: String,
    pub to_address: String,
    pub text_body: String,
    pub html_body: String,
    pub related_assets: Vec<Asset>,
}

/// Render context: record fields plus one `tag → content-id` entry per asset.
struct MessageContext<'a> {
    record: &'a Record,
    assets: &'a [Asset],
}

impl RenderContext for MessageContext<'_> {
    fn resolve(&self, name: &str) -> Resolved<'_> {
        let field = self.record.get(name);
        let asset = self.assets.iter().find(|a| a.tag() == name).map(Asset::tag);
        match (field, asset) {
            (Some(value), Some(cid)) if value != cid => Resolved::Ambiguous,
            (Some(value), _) => Resolved::Found(value),
            (None, Some(cid)) => Resolved::Found(cid),
            (None, None) => Resolved::Missing,
        }
    }
}

/// Render subject, text and HTML bodies for one record.
///
/// Inputs are not modified; `assets` is copied into the message.
pub fn render_message(
    prepared: &PreparedMerge,
    record: &Record,
    assets: &[Asset],
) -> Result<RenderedMessage, TemplateError> {
    let ctx = MessageContext { record, assets };

    Ok(RenderedMessage {
        subject: prepared.subject.render(&ctx)?,
        from_display_name: prepared.sender.display_name.clone(),
        from_address: prepared.sender.address.clone(),
        to_address: record.recipient().to_string(),
        text_body: prepared.templates.text().render(&ctx)?,
        html_body: prepared.templates.html().render(&ctx)?,
        related_assets: assets.to_vec(),
    })
}

impl RenderedMessage {
    /// Build the lettre message.
    pub fn to_message(&self) -> Result<Message, DeliveryError> {
        let from = Mailbox::new(
            self.from_display_name.clone(),
            parse_address(&self.from_address)?,
        );
        let to = Mailbox::new(None, parse_address(&self.to_address)?);

        let mut related = MultiPart::related().singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_HTML)
                .body(self.html_body.clone()),
        );
        for asset in &self.related_assets {
            let content_type = ContentType::parse(&asset.mime()).map_err(|e| {
                DeliveryError::Build(format!("content type of asset {}: {e}", asset.tag()))
            })?;
            related = related.singlepart(
                Attachment::new_inline(asset.tag().to_string())
                    .body(asset.bytes().to_vec(), content_type),
            );
        }

        Message::builder()
            .from(from)
            .to(to)
            .subject(self.subject.clone())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(self.text_body.clone()),
                    )
                    .multipart(related),
            )
            .map_err(|e| DeliveryError::Build(e.to_string()))
    }

    /// Serialized wire form of the message.
    pub fn formatted(&self) -> Result<Vec<u8>, DeliveryError> {
        Ok(self.to_message()?.formatted())
    }
}
