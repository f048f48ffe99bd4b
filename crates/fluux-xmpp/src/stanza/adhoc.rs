// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use minidom::Element;
use xmpp_parsers::data_forms::DataForm;
use xmpp_parsers::iq::{IqResultPayload, IqSetPayload};

use crate::ns;
use crate::util::{ElementExt, ParseError};

/// XEP-0050: Ad-Hoc Commands. Multi-step command sessions are the
/// substrate of XEP-0133 service administration.
#[derive(Debug, PartialEq, Clone)]
pub struct Command {
    pub node: String,
    pub sessionid: Option<String>,
    pub action: Option<Action>,
    pub status: Option<Status>,
    pub form: Option<DataForm>,
    pub available_actions: Vec<Action>,
    pub notes: Vec<Note>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Action {
    Execute,
    Next,
    Prev,
    Complete,
    Cancel,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Status {
    Executing,
    Completed,
    Canceled,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Note {
    pub r#type: NoteType,
    pub text: String,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum NoteType {
    Info,
    Warn,
    Error,
}

impl Command {
    pub fn execute(node: impl Into<String>) -> Self {
        Command {
            node: node.into(),
            sessionid: None,
            action: Some(Action::Execute),
            status: None,
            form: None,
            available_actions: vec![],
            notes: vec![],
        }
    }

    pub fn continue_session(
        node: impl Into<String>,
        sessionid: impl Into<String>,
        action: Action,
        form: Option<DataForm>,
    ) -> Self {
        Command {
            node: node.into(),
            sessionid: Some(sessionid.into()),
            action: Some(action),
            status: None,
            form,
            available_actions: vec![],
            notes: vec![],
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == Some(Status::Completed)
    }
}

impl Action {
    fn as_str(&self) -> &'static str {
        match self {
            Action::Execute => "execute",
            Action::Next => "next",
            Action::Prev => "prev",
            Action::Complete => "complete",
            Action::Cancel => "cancel",
        }
    }
}

impl std::str::FromStr for Action {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "execute" => Ok(Action::Execute),
            "next" => Ok(Action::Next),
            "prev" => Ok(Action::Prev),
            "complete" => Ok(Action::Complete),
            "cancel" => Ok(Action::Cancel),
            other => Err(ParseError::Generic {
                msg: format!("Unknown command action '{other}'"),
            }),
        }
    }
}

impl TryFrom<Element> for Command {
    type Error = ParseError;

    fn try_from(value: Element) -> Result<Self, Self::Error> {
        value.expect_is("command", ns::COMMANDS)?;

        let status = match value.attr("status") {
            None => None,
            Some("executing") => Some(Status::Executing),
            Some("completed") => Some(Status::Completed),
            Some("canceled") => Some(Status::Canceled),
            Some(other) => {
                return Err(ParseError::Generic {
                    msg: format!("Unknown command status '{other}'"),
                })
            }
        };

        let mut command = Command {
            node: value.attr_req("node")?.to_string(),
            sessionid: value.attr("sessionid").map(str::to_string),
            action: value.attr("action").map(str::parse).transpose()?,
            status,
            form: None,
            available_actions: vec![],
            notes: vec![],
        };

        for child in value.children() {
            match child.name() {
                "x" if child.has_ns(ns::DATA_FORMS) => {
                    command.form =
                        Some(
                            DataForm::try_from(child.clone()).map_err(|err| {
                                ParseError::Generic {
                                    msg: err.to_string(),
                                }
                            })?,
                        )
                }
                "actions" => {
                    command.available_actions = child
                        .children()
                        .map(|action| action.name().parse())
                        .collect::<Result<Vec<_>, _>>()?;
                }
                "note" => {
                    let r#type = match child.attr("type") {
                        Some("warn") => NoteType::Warn,
                        Some("error") => NoteType::Error,
                        _ => NoteType::Info,
                    };
                    command.notes.push(Note {
                        r#type,
                        text: child.text(),
                    });
                }
                _ => (),
            }
        }

        Ok(command)
    }
}

impl From<Command> for Element {
    fn from(value: Command) -> Self {
        Element::builder("command", ns::COMMANDS)
            .attr("node", value.node)
            .attr("sessionid", value.sessionid)
            .attr("action", value.action.map(|action| action.as_str()))
            .attr(
                "status",
                value.status.map(|status| match status {
                    Status::Executing => "executing",
                    Status::Completed => "completed",
                    Status::Canceled => "canceled",
                }),
            )
            .append_all(value.form.map(Element::from))
            .append_all(value.notes.into_iter().map(|note| {
                Element::builder("note", ns::COMMANDS)
                    .attr(
                        "type",
                        match note.r#type {
                            NoteType::Info => "info",
                            NoteType::Warn => "warn",
                            NoteType::Error => "error",
                        },
                    )
                    .append(note.text)
                    .build()
            }))
            .build()
    }
}

impl IqSetPayload for Command {}
impl IqResultPayload for Command {}
