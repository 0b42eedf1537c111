// Job CRUD and claim operations for the jobline SQLite database.

pub mod jobs;
