use gentree_core::database::DbPool;
use gentree_core::models::{
    ApprovalGate, Candidate, Job, NewCandidate, NewJob, NewPipelineStep, NewRun, Pipeline,
    PipelineStep, Run,
};
use serde_json::{json, Value};

/// A pipeline and its steps ordered by position
pub struct PipelineFixture {
    pub pipeline: Pipeline,
    pub steps: Vec<PipelineStep>,
}

impl PipelineFixture {
    pub fn base(&self) -> &PipelineStep {
        &self.steps[0]
    }

    pub fn step(&self, position: usize) -> &PipelineStep {
        &self.steps[position - 1]
    }
}

pub fn base_template() -> Value {
    json!({
        "3": {"class_type": "KSampler", "inputs": {"seed": "{{seed}}", "steps": 20}},
        "6": {"class_type": "CLIPTextEncode", "inputs": {"text": "{{prompt}}"}},
        "9": {"class_type": "SaveImage", "inputs": {"filename_prefix": "{{run_name}}/s{{step_position}}"}}
    })
}

pub fn refine_template() -> Value {
    json!({
        "10": {"class_type": "LoadImage", "inputs": {"image": "{{parent_image}}"}},
        "6": {"class_type": "CLIPTextEncode", "inputs": {"text": "{{prompt}}, refined"}},
        "9": {"class_type": "SaveImage", "inputs": {"filename_prefix": "{{run_name}}/s{{step_position}}"}}
    })
}

/// One step per entry of `max_children`; step 1 generates, later steps refine a parent
pub async fn create_pipeline(pool: &DbPool, name: &str, max_children: &[i64]) -> PipelineFixture {
    let mut conn = pool.acquire().await.expect("acquire");
    let pipeline = Pipeline::create(&mut conn, name)
        .await
        .expect("Failed to create pipeline");

    let mut steps = Vec::with_capacity(max_children.len());
    for (idx, cap) in max_children.iter().enumerate() {
        let position = idx as i64 + 1;
        let is_base = position == 1;
        let step = PipelineStep::create(
            &mut conn,
            NewPipelineStep {
                pipeline_id: pipeline.id,
                position,
                name: if is_base { "base".to_string() } else { format!("refine_{position}") },
                job_template: if is_base { base_template() } else { refine_template() },
                needs_prompt: true,
                needs_parent_image: !is_base,
                needs_variables: false,
                max_children: *cap,
            },
        )
        .await
        .expect("Failed to create pipeline step");
        steps.push(step);
    }

    PipelineFixture { pipeline, steps }
}

pub async fn create_run(pool: &DbPool, pipeline_id: i64, name: &str) -> Run {
    let mut conn = pool.acquire().await.expect("acquire");
    Run::create(
        &mut conn,
        NewRun {
            pipeline_id,
            name: name.to_string(),
            variables: json!({"prompt": "a red fox in fresh snow", "style": "ink"}),
        },
    )
    .await
    .expect("Failed to create run")
}

/// Insert an active candidate directly (bumps the parent's child_count like ingest does)
pub async fn create_candidate(
    pool: &DbPool,
    run_id: i64,
    step_id: i64,
    parent_id: Option<i64>,
) -> Candidate {
    let mut conn = pool.acquire().await.expect("acquire");
    Candidate::create(
        &mut conn,
        NewCandidate {
            run_id,
            step_id,
            parent_id,
            artifact_path: format!("output/run_{run_id}/{}.png", uuid::Uuid::new_v4().simple()),
        },
    )
    .await
    .expect("Failed to create candidate")
}

pub async fn create_candidate_with_score(
    pool: &DbPool,
    run_id: i64,
    step_id: i64,
    parent_id: Option<i64>,
    elo_score: i64,
) -> Candidate {
    let candidate = create_candidate(pool, run_id, step_id, parent_id).await;
    sqlx::query("UPDATE candidates SET elo_score = ? WHERE id = ?")
        .bind(elo_score)
        .bind(candidate.id)
        .execute(pool)
        .await
        .expect("Failed to set elo_score");
    reload_candidate(pool, candidate.id).await
}

pub async fn reload_candidate(pool: &DbPool, id: i64) -> Candidate {
    let mut conn = pool.acquire().await.expect("acquire");
    Candidate::get(&mut conn, id).await.expect("candidate exists")
}

pub async fn reload_run(pool: &DbPool, id: i64) -> Run {
    let mut conn = pool.acquire().await.expect("acquire");
    Run::get(&mut conn, id).await.expect("run exists")
}

pub async fn reload_job(pool: &DbPool, id: i64) -> Job {
    let mut conn = pool.acquire().await.expect("acquire");
    Job::get(&mut conn, id).await.expect("job exists")
}

pub async fn approve_step(pool: &DbPool, run_id: i64, step_id: i64, top_k_count: i64) -> ApprovalGate {
    let mut conn = pool.acquire().await.expect("acquire");
    ApprovalGate::approve(&mut conn, run_id, step_id, top_k_count)
        .await
        .expect("Failed to approve step")
}

/// A pending job that has not been sent anywhere yet
pub async fn create_pending_job(pool: &DbPool, run_id: i64, step_id: i64, parent_id: Option<i64>) -> Job {
    let mut conn = pool.acquire().await.expect("acquire");
    Job::create(
        &mut conn,
        NewJob {
            run_id,
            step_id,
            parent_candidate_id: parent_id,
            payload: json!({}),
        },
    )
    .await
    .expect("Failed to create job")
}

/// A completed job with one output, ready for ingest
pub async fn create_completed_job(
    pool: &DbPool,
    run_id: i64,
    step_id: i64,
    parent_id: Option<i64>,
    filename: &str,
) -> Job {
    let job = create_pending_job(pool, run_id, step_id, parent_id).await;
    let mut conn = pool.acquire().await.expect("acquire");
    Job::mark_submitted(&mut conn, job.id, &format!("ext-{}", job.id))
        .await
        .expect("mark submitted");
    Job::mark_completed(
        &mut conn,
        job.id,
        &json!({"outputs": [{"filename": filename, "subfolder": format!("run_{run_id}"), "type": "output"}]}),
    )
    .await
    .expect("mark completed")
}

pub async fn set_child_count(pool: &DbPool, candidate_id: i64, value: i64) {
    let mut conn = pool.acquire().await.expect("acquire");
    Candidate::set_child_count(&mut conn, candidate_id, value)
        .await
        .expect("Failed to set child_count");
}
