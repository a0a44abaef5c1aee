//! Integration tests for fan-out/fan-in groups.

use std::time::Duration;

use async_trait::async_trait;
use stagegraph::{
    stage_fn, PipelineGraph, PipelineState, Stage, StageError, StateSchema, StateUpdate, END,
    START,
};

/// Sleeps before writing `field`, so branches complete out of declaration order.
struct Slow {
    name: &'static str,
    field: &'static str,
    delay_ms: u64,
}

#[async_trait]
impl Stage for Slow {
    fn name(&self) -> &str {
        self.name
    }

    async fn run(&self, state: &PipelineState) -> Result<StateUpdate, StageError> {
        let draft = state
            .text("draft")
            .ok_or_else(|| StageError::MissingField("draft".into()))?
            .to_string();
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        Ok(StateUpdate::new()
            .set(self.field, format!("{} on {draft}", self.name))
            .push("progress", self.name))
    }
}

#[tokio::test]
async fn join_sees_both_branches_regardless_of_finish_order() {
    let mut g = PipelineGraph::new(StateSchema::new().append("progress"));
    g.add_stage(stage_fn("content_creator", |_: &PipelineState| {
        Ok(StateUpdate::new().set("draft", "post").push("progress", "content_creator"))
    }))
    .add_stage(Slow {
        name: "fact_checker",
        field: "fact_check_result",
        delay_ms: 30,
    })
    .add_stage(Slow {
        name: "seo_optimizer",
        field: "seo_suggestions",
        delay_ms: 1,
    })
    .add_stage(stage_fn("editor", |s: &PipelineState| {
        let fact = s
            .text("fact_check_result")
            .ok_or_else(|| StageError::MissingField("fact_check_result".into()))?;
        let seo = s
            .text("seo_suggestions")
            .ok_or_else(|| StageError::MissingField("seo_suggestions".into()))?;
        Ok(StateUpdate::new()
            .set("editor_input", format!("{fact} + {seo}"))
            .push("progress", "editor"))
    }))
    .add_edge(START, "content_creator")
    .add_fan_out("content_creator", ["fact_checker", "seo_optimizer"], "editor")
    .add_edge("editor", END);

    let out = g.compile().unwrap().invoke(PipelineState::new()).await.unwrap();
    assert_eq!(
        out.str("editor_input"),
        Some("fact_checker on post + seo_optimizer on post")
    );
    assert_eq!(
        out.strings("progress"),
        vec!["content_creator", "fact_checker", "seo_optimizer", "editor"]
    );
}
