//! Group history unit: INVITE / EXPEL / QUIT / RESET / QUERY.
//!
//! Authority rules: only the owner may reset the member list; owner and
//! administrators may invite and expel; any member may quit (except the
//! owner) or query. Commands older than the newest applied history are
//! answered with the current member list instead of being applied.

use tracing::{debug, warn};

use dim_mkm::ID;

use crate::barrack::Barrack;
use crate::command::{command_name, Command, GroupCommand};
use crate::delegate::Archivist;
use crate::content::Content;
use crate::message::ReliableMessage;
use crate::processor::{ContentProcessor, Processor};

use super::contents::receipt;

pub struct GroupUnit;

impl ContentProcessor for GroupUnit {
    fn process(
        &self,
        content: &Content,
        message: &ReliableMessage,
        processor: &Processor,
    ) -> Vec<Content> {
        let command = match content {
            Content::Command(Command::Group(command))
            | Content::History(Command::Group(command)) => command,
            _ => return Vec::new(),
        };
        let group = match command.group() {
            Ok(group) => group,
            Err(error) => {
                warn!(%error, "group command unreadable");
                return vec![receipt("Group command error!", message, content)];
            }
        };
        let sender = message.sender();
        let barrack = processor.barrack();

        // replayed or out-of-order history
        if let Some(time) = content.time() {
            if barrack.is_history_expired(&group, time) {
                debug!(%group, %sender, "stale group command");
                return self.current_members(barrack, &group, message, content);
            }
        }

        let responses = match command.name() {
            command_name::RESET => self.reset(barrack, &group, sender, command, message, content),
            command_name::INVITE => self.invite(barrack, &group, sender, command, message, content),
            command_name::EXPEL => self.expel(barrack, &group, sender, command, message, content),
            command_name::QUIT => self.quit(barrack, &group, sender, message, content),
            command_name::QUERY => self.query(barrack, &group, sender, message, content),
            other => {
                warn!(name = other, "unexpected group command");
                Vec::new()
            }
        };
        if let Some(time) = content.time() {
            if command.name() != command_name::QUERY {
                barrack.record_history_time(&group, time);
            }
        }
        responses
    }
}

impl GroupUnit {
    fn reset(
        &self,
        barrack: &Barrack,
        group: &ID,
        sender: &ID,
        command: &GroupCommand,
        message: &ReliableMessage,
        content: &Content,
    ) -> Vec<Content> {
        if barrack.owner(group).as_ref() != Some(sender) {
            return denied("reset", group, message, content);
        }
        let members = command.members();
        if members.is_empty() {
            return vec![receipt("Reset command without members", message, content)];
        }
        barrack.archivist().save_members(group, &members);
        Vec::new()
    }

    fn invite(
        &self,
        barrack: &Barrack,
        group: &ID,
        sender: &ID,
        command: &GroupCommand,
        message: &ReliableMessage,
        content: &Content,
    ) -> Vec<Content> {
        if !is_administrator(barrack, group, sender) {
            return denied("invite", group, message, content);
        }
        let mut members = barrack.members(group);
        for invited in command.members() {
            if !members.contains(&invited) {
                members.push(invited);
            }
        }
        barrack.archivist().save_members(group, &members);
        Vec::new()
    }

    fn expel(
        &self,
        barrack: &Barrack,
        group: &ID,
        sender: &ID,
        command: &GroupCommand,
        message: &ReliableMessage,
        content: &Content,
    ) -> Vec<Content> {
        if !is_administrator(barrack, group, sender) {
            return denied("expel", group, message, content);
        }
        let owner = barrack.owner(group);
        let expelled = command.members();
        if expelled.iter().any(|member| Some(member) == owner.as_ref()) {
            return vec![receipt("Cannot expel the group owner", message, content)];
        }
        let members: Vec<ID> = barrack
            .members(group)
            .into_iter()
            .filter(|member| !expelled.contains(member))
            .collect();
        barrack.archivist().save_members(group, &members);
        Vec::new()
    }

    fn quit(
        &self,
        barrack: &Barrack,
        group: &ID,
        sender: &ID,
        message: &ReliableMessage,
        content: &Content,
    ) -> Vec<Content> {
        if barrack.owner(group).as_ref() == Some(sender) {
            return vec![receipt("Owner cannot quit the group", message, content)];
        }
        let members = barrack.members(group);
        if !members.contains(sender) {
            return denied("quit", group, message, content);
        }
        let members: Vec<ID> = members
            .into_iter()
            .filter(|member| member != sender)
            .collect();
        barrack.archivist().save_members(group, &members);
        Vec::new()
    }

    fn query(
        &self,
        barrack: &Barrack,
        group: &ID,
        sender: &ID,
        message: &ReliableMessage,
        content: &Content,
    ) -> Vec<Content> {
        if !barrack.members(group).contains(sender)
            && !is_administrator(barrack, group, sender)
        {
            return denied("query", group, message, content);
        }
        self.current_members(barrack, group, message, content)
    }

    fn current_members(
        &self,
        barrack: &Barrack,
        group: &ID,
        message: &ReliableMessage,
        content: &Content,
    ) -> Vec<Content> {
        let members = barrack.members(group);
        if members.is_empty() {
            return vec![receipt(
                &format!("Group empty: {group}"),
                message,
                content,
            )];
        }
        vec![Content::History(Command::Group(GroupCommand::reset(
            group, &members,
        )))]
    }
}

fn is_administrator(barrack: &Barrack, group: &ID, user: &ID) -> bool {
    barrack.owner(group).as_ref() == Some(user)
        || barrack.administrators(group).contains(user)
}

fn denied(
    action: &str,
    group: &ID,
    message: &ReliableMessage,
    content: &Content,
) -> Vec<Content> {
    warn!(%group, action, sender = %message.sender(), "group command without authority");
    vec![receipt(
        &format!("Permission denied: {action} {group}"),
        message,
        content,
    )]
}
