//! Dry run: what `run` would launch and skip, without spawning anything.

use crate::batch::PreparedBatch;
use crate::io::claim::ChildInvocation;

/// Render one line per enumerated unit, in id order.
///
/// ```text
/// launch unit 1: bitz claim --keypair keys/id1.json ...
/// skip   unit 2: keys/id2.json (file not found)
/// ```
pub fn render_plan(prepared: &PreparedBatch) -> Vec<String> {
    let mut lines: Vec<(u32, String)> = prepared
        .eligible
        .iter()
        .map(|unit| {
            let invocation = ChildInvocation::for_unit(unit, &prepared.config);
            let mut line = format!("launch unit {}: {}", unit.id, invocation.program);
            for arg in &invocation.args {
                line.push(' ');
                line.push_str(arg);
            }
            (unit.id.0, line)
        })
        .collect();
    lines.extend(prepared.notices.iter().map(|notice| {
        (
            notice.id.0,
            format!(
                "skip   unit {}: {} ({})",
                notice.id,
                notice.path.display(),
                notice.reason
            ),
        )
    }));
    lines.sort_by_key(|(id, _)| *id);

    let mut out: Vec<String> = lines.into_iter().map(|(_, line)| line).collect();
    out.push(format!(
        "plan: units={} launch={} skip={} concurrency={} delay_ms={}",
        prepared.config.unit_count,
        prepared.eligible.len(),
        prepared.notices.len(),
        prepared.config.max_concurrency,
        prepared.config.launch_delay.as_millis()
    ));
    out
}
