//! SQLite schema definitions.
//!
//! Timestamps are stored as RFC 3339 text and JSON artifacts as TEXT
//! columns, both written by the application.

/// SQL schema for the questions table.
pub const CREATE_QUESTIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS questions (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    question              TEXT    NOT NULL,
    topic                 TEXT    NOT NULL,
    sub_topic             TEXT    NOT NULL,
    training_type         TEXT    NOT NULL,

    status                TEXT    NOT NULL DEFAULT 'pending',
    pipeline_stage        TEXT    NOT NULL DEFAULT 'pending',

    -- Research artifacts
    ground_truth_context  TEXT,
    synthesized_context   TEXT,
    context_sources       TEXT    NOT NULL DEFAULT '[]',
    context_quality_score REAL,

    -- Review verdict (JSON)
    review                TEXT,

    created_at            TEXT    NOT NULL,
    updated_at            TEXT    NOT NULL
)
"#;

/// SQL schema for the synthetic_data table holding approved examples.
pub const CREATE_SYNTHETIC_DATA_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS synthetic_data (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    question_id    INTEGER NOT NULL REFERENCES questions(id) ON DELETE CASCADE,
    training_type  TEXT    NOT NULL,
    payload        TEXT    NOT NULL,
    quality_score  REAL,
    review_status  TEXT    NOT NULL,
    reviewer_notes TEXT,
    created_at     TEXT    NOT NULL
)
"#;

/// Index on the pipeline stage, used by pending/status queries.
pub const CREATE_QUESTIONS_STAGE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_questions_stage ON questions(pipeline_stage)";

/// Index on the classification columns.
pub const CREATE_QUESTIONS_TOPIC_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_questions_topic ON questions(topic, sub_topic)";

/// Index on synthetic data by training type.
pub const CREATE_SYNTHETIC_DATA_TYPE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_synthetic_data_type ON synthetic_data(training_type)";

/// Returns all schema statements in dependency order.
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_QUESTIONS_TABLE,
        CREATE_SYNTHETIC_DATA_TABLE,
        CREATE_QUESTIONS_STAGE_INDEX,
        CREATE_QUESTIONS_TOPIC_INDEX,
        CREATE_SYNTHETIC_DATA_TYPE_INDEX,
    ]
}

/// Table names in the schema.
pub mod tables {
    pub const QUESTIONS: &str = "questions";
    pub const SYNTHETIC_DATA: &str = "synthetic_data";
    pub const MIGRATIONS: &str = "_migrations";
}
