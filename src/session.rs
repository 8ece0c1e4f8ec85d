use crate::{database::Database, errors};
use uuid::Uuid;

/// One REPL/executor session: the currently selected database plus a
/// session id used only for log correlation (spec's core has no notion of
/// concurrent sessions; this exists for the shell layer above it).
pub struct Session {
    pub id: Uuid,
    pub database: Database,
}

impl Session {
    pub fn open() -> Result<Self, errors::Error> {
        Ok(Session {
            id: Uuid::new_v4(),
            database: Database::open()?,
        })
    }

    pub fn close(&mut self) -> Result<(), errors::Error> {
        self.database.flush()?;
        Ok(())
    }
}
