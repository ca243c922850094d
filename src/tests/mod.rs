//! End-to-end tests driving the full router against in-memory SQLite.
