// fluux-core/fluux-xmpp
//
// Copyright: 2025, ProcessOne SARL <contact@process-one.net>
// License: Mozilla Public License v2.0 (MPL v2.0)

use anyhow::Result;
use jid::Jid;
use xmpp_parsers::data_forms::DataForm;
use xmpp_parsers::iq::Iq;

use crate::client::ModuleContext;
use crate::mods::{Disco, Module};
use crate::ns;
use crate::stanza::adhoc::{Action, Command};
use crate::util::RequestError;

/// XEP-0133 Service Administration, on top of XEP-0050 ad-hoc command
/// sessions. A session starts with `execute`, walks through forms with
/// `continue_session`, and ends on a `completed` status or `cancel`.
#[derive(Default, Clone)]
pub struct Admin {
    ctx: ModuleContext,
}

/// An admin command as advertised by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandItem {
    pub node: String,
    pub name: Option<String>,
}

impl Module for Admin {
    fn register_with(&mut self, context: ModuleContext) {
        self.ctx = context
    }
}

impl Admin {
    /// Lists the ad-hoc commands the server advertises.
    /// https://xmpp.org/extensions/xep-0050.html#disco
    pub async fn discover_commands(&self, disco: &Disco) -> Result<Vec<CommandItem>, RequestError> {
        let items = disco
            .query_items(
                Jid::from(self.ctx.server_jid()),
                Some(ns::COMMANDS.to_string()),
            )
            .await?;

        Ok(items
            .items
            .into_iter()
            .map(|item| CommandItem {
                node: item.node.unwrap_or_default(),
                name: item.name,
            })
            .collect())
    }

    /// Starts a command session. The response either completes
    /// immediately or carries a form to fill in.
    pub async fn execute(
        &self,
        to: impl Into<Jid>,
        node: impl Into<String>,
    ) -> Result<Command, RequestError> {
        self.send_command(to, Command::execute(node)).await
    }

    /// Advances a multi-step session with a submitted form.
    pub async fn continue_session(
        &self,
        to: impl Into<Jid>,
        node: impl Into<String>,
        sessionid: impl Into<String>,
        action: Action,
        form: Option<DataForm>,
    ) -> Result<Command, RequestError> {
        self.send_command(to, Command::continue_session(node, sessionid, action, form))
            .await
    }

    pub async fn cancel(
        &self,
        to: impl Into<Jid>,
        node: impl Into<String>,
        sessionid: impl Into<String>,
    ) -> Result<Command, RequestError> {
        self.send_command(
            to,
            Command::continue_session(node, sessionid, Action::Cancel, None),
        )
        .await
    }

    async fn send_command(
        &self,
        to: impl Into<Jid>,
        command: Command,
    ) -> Result<Command, RequestError> {
        let response = self
            .ctx
            .send_iq(Iq::from_set(self.ctx.generate_id(), command).with_to(to.into()))
            .await?
            .ok_or(RequestError::UnexpectedResponse)?;

        Ok(Command::try_from(response)?)
    }
}
