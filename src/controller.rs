use std::time::Duration;
use tracing::trace;

use crate::domain::{Message, PVConfig, PVError};
use ratatui::crossterm::event::{self, Event, KeyCode, KeyEvent};

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &PVConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    /// Waits at most `event_poll_time` ms for a terminal event.
    pub fn handle_event(&self) -> Result<Option<Message>, PVError> {
        if event::poll(Duration::from_millis(self.event_poll_time))?
            && let Event::Key(key) = event::read()?
            && key.kind == event::KeyEventKind::Press
        {
            return Ok(Self::handle_key(key));
        }
        Ok(None)
    }

    fn handle_key(key: KeyEvent) -> Option<Message> {
        let message = match key.code {
            KeyCode::Char('q') => Some(Message::Quit),
            KeyCode::Char('n') | KeyCode::Right | KeyCode::PageDown => Some(Message::NextPage),
            KeyCode::Char('p') | KeyCode::Left | KeyCode::PageUp => Some(Message::PrevPage),
            KeyCode::Char('j') | KeyCode::Down => Some(Message::MoveDown),
            KeyCode::Char('k') | KeyCode::Up => Some(Message::MoveUp),
            KeyCode::Char('r') => Some(Message::Refresh),
            KeyCode::Char('c') => Some(Message::CopyRecord),
            KeyCode::Char('?') => Some(Message::Help),
            KeyCode::Esc => Some(Message::Exit),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}
