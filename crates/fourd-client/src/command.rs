//! Command state machine and pending-command table.
//!
//! Each request/response exchange is tracked as a [`Command`]. A paginated
//! query is a chain of commands (EXECUTE-STATEMENT plus zero or more
//! FETCH-RESULT continuations); every link carries the root command id so
//! the caller awaiting the original exchange observes completion of the
//! whole chain.

use std::collections::HashMap;

use fourd_protocol::{CommandId, Verb};

use crate::error::Error;
use crate::result::ResultSet;

/// Command lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CommandState {
    /// Sent, nothing received yet.
    Pending,
    /// A Result-Set header has arrived; rows are being accumulated.
    PartiallyReceived,
    /// Terminal state; the command has been removed from the table.
    Completed,
}

/// One in-flight request/response exchange.
#[derive(Debug)]
pub(crate) struct Command {
    pub id: CommandId,
    /// Id of the first command in this exchange's chain.
    pub root_id: CommandId,
    pub verb: Verb,
    pub state: CommandState,
    pub result: Option<ResultSet>,
}

impl Command {
    pub fn new(id: CommandId, verb: Verb) -> Self {
        Self {
            id,
            root_id: id,
            verb,
            state: CommandState::Pending,
            result: None,
        }
    }

    /// Create a FETCH-RESULT continuation carrying this command's root id
    /// and accumulated result.
    pub fn continuation(id: CommandId, root_id: CommandId, result: ResultSet) -> Self {
        Self {
            id,
            root_id,
            verb: Verb::FetchResult,
            state: CommandState::Pending,
            result: Some(result),
        }
    }
}

/// Terminal outcome of a command chain.
#[derive(Debug)]
pub(crate) struct Completion {
    /// Root id of the completed chain.
    pub root_id: CommandId,
    /// The chain's outcome.
    pub outcome: Result<ResultSet, Error>,
}

/// Pending commands, keyed by command id.
///
/// Owned exclusively by one connection; a command is removed exactly when
/// it completes, never earlier.
#[derive(Debug, Default)]
pub(crate) struct CommandTable {
    commands: HashMap<CommandId, Command>,
}

impl CommandTable {
    pub fn insert(&mut self, command: Command) {
        debug_assert!(!self.commands.contains_key(&command.id));
        self.commands.insert(command.id, command);
    }

    pub fn get_mut(&mut self, id: CommandId) -> Option<&mut Command> {
        self.commands.get_mut(&id)
    }

    /// Remove a command, marking it completed.
    pub fn complete(&mut self, id: CommandId) -> Option<Command> {
        self.commands.remove(&id).map(|mut command| {
            command.state = CommandState::Completed;
            command
        })
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
