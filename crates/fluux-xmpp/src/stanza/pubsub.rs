// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use jid::Jid;
use minidom::Element;

use crate::ns;
use crate::util::ElementExt;

/// A `<message type="headline"/>` carrying PubSub `<event/>` payloads.
#[derive(Debug, Clone, PartialEq)]
pub struct PubSubMessage {
    pub from: Jid,
    pub events: Vec<PubSubEvent>,
}

/// The one event shape this library consumes: items published or
/// retracted on a node. Everything else (purge, delete, config) is
/// ignored upstream.
#[derive(Debug, Clone, PartialEq)]
pub struct PubSubEvent {
    pub node: String,
    pub published: Vec<PubSubItem>,
    pub retracted: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PubSubItem {
    pub id: Option<String>,
    pub publisher: Option<String>,
    pub payload: Option<Element>,
}

impl TryFrom<Element> for PubSubEvent {
    type Error = anyhow::Error;

    fn try_from(value: Element) -> Result<Self, Self::Error> {
        value.expect_is("event", ns::PUBSUB_EVENT)?;

        let items = value
            .get_child("items", ns::PUBSUB_EVENT)
            .ok_or_else(|| anyhow::format_err!("Unsupported PubSub event."))?;

        let mut event = PubSubEvent {
            node: items.attr_req("node")?.to_string(),
            published: vec![],
            retracted: vec![],
        };

        for child in items.children() {
            match child.name() {
                "item" => event.published.push(PubSubItem {
                    id: child.attr("id").map(str::to_string),
                    publisher: child.attr("publisher").map(str::to_string),
                    payload: child.children().next().cloned(),
                }),
                "retract" => {
                    if let Some(id) = child.attr("id") {
                        event.retracted.push(id.to_string())
                    }
                }
                _ => (),
            }
        }

        Ok(event)
    }
}

/// Builders for the handful of XEP-0060 IQ payloads this library
/// issues. Kept by hand so the wire shape is explicit.
pub mod query {
    use minidom::Element;
    use xmpp_parsers::data_forms::DataForm;

    use super::PubSubItem;
    use crate::ns;
    use crate::util::ParseError;

    /// `<pubsub><publish node="…"><item id="…">payload</item></publish>…</pubsub>`
    pub fn publish(
        node: &str,
        item_id: Option<&str>,
        payload: Element,
        publish_options: Option<DataForm>,
    ) -> Element {
        Element::builder("pubsub", ns::PUBSUB)
            .append(
                Element::builder("publish", ns::PUBSUB)
                    .attr("node", node)
                    .append(
                        Element::builder("item", ns::PUBSUB)
                            .attr("id", item_id)
                            .append(payload)
                            .build(),
                    )
                    .build(),
            )
            .append_all(publish_options.map(|form| {
                Element::builder("publish-options", ns::PUBSUB)
                    .append(Element::from(form))
                    .build()
            }))
            .build()
    }

    /// `<pubsub><items node="…"/></pubsub>`, optionally restricted to
    /// specific item ids.
    pub fn items(node: &str, item_ids: &[&str], max_items: Option<u32>) -> Element {
        Element::builder("pubsub", ns::PUBSUB)
            .append(
                Element::builder("items", ns::PUBSUB)
                    .attr("node", node)
                    .attr("max_items", max_items)
                    .append_all(item_ids.iter().map(|id| {
                        Element::builder("item", ns::PUBSUB).attr("id", *id).build()
                    }))
                    .build(),
            )
            .build()
    }

    /// `<pubsub><retract node="…" notify="1"><item id="…"/></retract></pubsub>`
    pub fn retract(node: &str, item_id: &str, notify: bool) -> Element {
        Element::builder("pubsub", ns::PUBSUB)
            .append(
                Element::builder("retract", ns::PUBSUB)
                    .attr("node", node)
                    .attr("notify", notify.then_some("1"))
                    .append(
                        Element::builder("item", ns::PUBSUB)
                            .attr("id", item_id)
                            .build(),
                    )
                    .build(),
            )
            .build()
    }

    /// Unwraps `<pubsub><items node="…"><item/>…</items></pubsub>`.
    pub fn parse_items_response(response: Element) -> Result<Vec<PubSubItem>, ParseError> {
        use crate::util::ElementExt;

        response.expect_is("pubsub", ns::PUBSUB)?;

        let Some(items) = response.get_child("items", ns::PUBSUB) else {
            return Ok(vec![]);
        };

        Ok(items
            .children()
            .filter(|child| child.name() == "item")
            .map(|child| PubSubItem {
                id: child.attr("id").map(str::to_string),
                publisher: child.attr("publisher").map(str::to_string),
                payload: child.children().next().cloned(),
            })
            .collect())
    }
}

impl TryFrom<xmpp_parsers::message::Message> for PubSubMessage {
    type Error = anyhow::Error;

    fn try_from(root: xmpp_parsers::message::Message) -> Result<Self, Self::Error> {
        let Some(from) = root.from else {
            return Err(anyhow::format_err!("Missing 'from' in PubSub message."));
        };

        let events = root
            .payloads
            .into_iter()
            .filter(|payload| payload.is("event", ns::PUBSUB_EVENT))
            .map(PubSubEvent::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        if events.is_empty() {
            return Err(anyhow::format_err!(
                "Headline message does not contain any PubSub events."
            ));
        }

        Ok(PubSubMessage { from, events })
    }
}
