//! Lightweight random test data generation, built on `rand` only — no
//! `fake`/`proptest` dependency, since the teacher's property-testing setup
//! had no real use once the domain changed and `mocks/Cargo.toml` never
//! carried those crates for this repo.

use chrono::Utc;
use rand::Rng;

use task_core::models::{Priority, Task, TaskStatus, TaskType};
use task_core::store::NewTaskInput;

use crate::builders::{NewTaskInputBuilder, TaskBuilder};

const TITLE_WORDS: &[&str] = &[
    "implement", "refactor", "investigate", "document", "migrate", "optimize", "stabilize",
    "the", "payment", "ingest", "retry", "auth", "cache", "scheduler", "path", "pipeline",
];

const AGENT_POOL: &[&str] = &[
    "agent-claim-1",
    "agent-claim-2",
    "agent-review-1",
    "agent-research-1",
    "agent-docs-1",
];

/// Generate a realistic-looking agent id.
pub fn generate_agent_id() -> String {
    AGENT_POOL[rand::thread_rng().gen_range(0..AGENT_POOL.len())].to_string()
}

/// Generate a short title out of a fixed word pool, mimicking real titles
/// without pulling in a sentence-generation crate.
pub fn generate_title() -> String {
    let mut rng = rand::thread_rng();
    let len = rng.gen_range(3..8);
    let words: Vec<&str> = (0..len).map(|_| TITLE_WORDS[rng.gen_range(0..TITLE_WORDS.len())]).collect();
    let mut title = words.join(" ");
    title.get_mut(0..1).map(|s| s.make_ascii_uppercase());
    title
}

/// Generate a plausible task instruction paragraph.
pub fn generate_instruction() -> String {
    format!("{}. Cover the edge cases called out in the linked discussion.", generate_title())
}

fn random_task_type(rng: &mut impl Rng) -> TaskType {
    match rng.gen_range(0..3) {
        0 => TaskType::Concrete,
        1 => TaskType::Abstract,
        _ => TaskType::Epic,
    }
}

fn random_priority(rng: &mut impl Rng) -> Priority {
    match rng.gen_range(0..4) {
        0 => Priority::Low,
        1 => Priority::Medium,
        2 => Priority::High,
        _ => Priority::Critical,
    }
}

fn random_task_status(rng: &mut impl Rng) -> TaskStatus {
    match rng.gen_range(0..5) {
        0 => TaskStatus::Available,
        1 => TaskStatus::InProgress,
        2 => TaskStatus::Complete,
        3 => TaskStatus::Blocked,
        _ => TaskStatus::Cancelled,
    }
}

/// Generate a random, internally consistent `Task` snapshot.
pub fn generate_random_task() -> Task {
    let mut rng = rand::thread_rng();
    let id: i64 = rng.gen_range(1..99_999);
    let status = random_task_status(&mut rng);
    let mut builder = TaskBuilder::new()
        .with_id(id)
        .with_title(generate_title())
        .with_priority(random_priority(&mut rng));
    builder = builder.with_status(status);
    if status == TaskStatus::InProgress || status == TaskStatus::Complete {
        builder = builder.with_assigned_agent(generate_agent_id());
    }
    let mut task = builder.build();
    if status == TaskStatus::Complete {
        task.completed_at.get_or_insert(Utc::now());
    }
    task
}

/// Generate a random `NewTaskInput` ready for `Store::create_task`.
pub fn generate_random_new_task_input() -> NewTaskInput {
    let mut rng = rand::thread_rng();
    NewTaskInputBuilder::new()
        .with_title(generate_title())
        .with_task_type(random_task_type(&mut rng))
        .with_priority(random_priority(&mut rng))
        .with_created_by(generate_agent_id())
        .build()
}

/// Configurable generator for bulk-seeding a store with related tasks.
pub struct TaskGenerator {
    pub agent_pool: Vec<String>,
}

impl Default for TaskGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGenerator {
    pub fn new() -> Self {
        Self { agent_pool: AGENT_POOL.iter().map(|s| s.to_string()).collect() }
    }

    pub fn generate(&self) -> NewTaskInput {
        let mut rng = rand::thread_rng();
        let agent = &self.agent_pool[rng.gen_range(0..self.agent_pool.len())];
        NewTaskInputBuilder::new()
            .with_title(generate_title())
            .with_task_type(random_task_type(&mut rng))
            .with_priority(random_priority(&mut rng))
            .with_created_by(agent.clone())
            .build()
    }

    pub fn generate_batch(&self, count: usize) -> Vec<NewTaskInput> {
        (0..count).map(|_| self.generate()).collect()
    }
}
