//! SQLite database for timer storage.

tempo_core::define_database!(Database, "Timer database migrations complete");
