// Database schema for the provenance store

pub const PROVENANCE_SCHEMA: &str = include_str!("../../migrations/001_provenance_schema.sql");
