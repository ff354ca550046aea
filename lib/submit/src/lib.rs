//! The submit-description compiler (C5, §4.5): parses submit-file text,
//! builds the `queue` iterator, and runs the fixed rule table once per
//! produced proc. Pure — no network I/O; callers drive `qmgmt` with the
//! resulting ads.

pub mod custom_attrs;
pub mod parse;
pub mod queue_iter;
mod rules;

use condor_client::{config::ConfigSnapshot, submit::SubmitResult};

pub use parse::ParseError;
pub use queue_iter::QueueError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
  #[error(transparent)]
  Parse(#[from] ParseError),
  #[error(transparent)]
  Queue(#[from] QueueError),
}

/// The macro frame pushed for one produced proc (§4.5 step 1). `Cluster`
/// and `ClusterId` are the same value, as are `Process`/`ProcId`/`Node`
/// outside the parallel universe, matching real daemons' attribute
/// naming.
#[derive(Debug, Clone)]
pub struct MacroFrame {
  pub cluster_id: i32,
  pub proc_id: i32,
  pub node: i32,
  pub item_index: u32,
  pub item: String,
  pub step: u32,
  pub row: u32,
  pub vars: Vec<(String, String)>,
}

/// Builds the per-proc config view: the submission's own statements
/// layered over `base`, then the macro frame's bound variables layered
/// on top of that (§4.5: "executes remaining statements against a
/// fresh config view").
fn file_view(base: &ConfigSnapshot, statements: &[(String, String)]) -> ConfigSnapshot {
  let mut view = base.clone();
  for (key, value) in statements {
    view.set(key, value);
  }
  view
}

fn frame_view(base: &ConfigSnapshot, frame: &MacroFrame) -> ConfigSnapshot {
  let mut view = base.clone();
  view.set("Cluster", frame.cluster_id.to_string());
  view.set("Process", frame.proc_id.to_string());
  view.set("ClusterId", frame.cluster_id.to_string());
  view.set("ProcId", frame.proc_id.to_string());
  view.set("Node", frame.node.to_string());
  view.set("ItemIndex", frame.item_index.to_string());
  view.set("Step", frame.step.to_string());
  view.set("Row", frame.row.to_string());
  view.set("Item", frame.item.clone());
  for (name, value) in &frame.vars {
    view.set(name, value);
  }
  view
}

/// Eagerly compiles `text` against `base` into a full `SubmitResult`
/// (`Submit` mode, §4.5).
pub fn submit(
  text: &str,
  base: &ConfigSnapshot,
  cluster_id: i32,
) -> Result<SubmitResult, SubmitError> {
  let description = parse::parse(text)?;
  let view = file_view(base, &description.statements);
  let mut iter = queue_iter::build(&description.queue)?;

  let mut proc_ads = Vec::with_capacity(iter.count());
  let mut proc_id = 0i32;
  while let Some((item, step)) = iter.next() {
    let frame = MacroFrame {
      cluster_id,
      proc_id,
      node: proc_id,
      item_index: item.item_index,
      item: item.item.clone(),
      step,
      row: item.item_index,
      vars: item.vars.clone(),
    };
    let per_proc_view = frame_view(&view, &frame);
    proc_ads.push(rules::build_ad(
      &per_proc_view,
      description.universe,
      &frame,
      &description.statements,
    ));
    proc_id += 1;
  }

  let mut cluster_ad = proc_ads.first().cloned().unwrap_or_default();
  cluster_ad.insert("ProcId", condor_client::job::JobId::CLUSTER_TEMPLATE_PROC);

  Ok(SubmitResult { cluster_id, num_procs: proc_ads.len() as u32, cluster_ad, proc_ads })
}

/// An iterator over proc ads that reruns the macro-frame push / build /
/// pop steps at each `queue` step instead of materializing the whole
/// cluster up front (`SubmitLate` mode, §4.5). Produces ads identical to
/// `submit` for the same inputs.
pub struct LateSubmit {
  view: ConfigSnapshot,
  universe: condor_client::submit::Universe,
  statements: Vec<(String, String)>,
  queue: queue_iter::QueueIterator,
  cluster_id: i32,
  next_proc_id: i32,
}

impl Iterator for LateSubmit {
  type Item = condor_client::classad::ClassAd;

  fn next(&mut self) -> Option<Self::Item> {
    let (item, step) = self.queue.next()?;
    let frame = MacroFrame {
      cluster_id: self.cluster_id,
      proc_id: self.next_proc_id,
      node: self.next_proc_id,
      item_index: item.item_index,
      item: item.item.clone(),
      step,
      row: item.item_index,
      vars: item.vars.clone(),
    };
    let per_proc_view = frame_view(&self.view, &frame);
    let ad = rules::build_ad(&per_proc_view, self.universe, &frame, &self.statements);
    self.next_proc_id += 1;
    Some(ad)
  }
}

impl LateSubmit {
  pub fn cluster_id(&self) -> i32 {
    self.cluster_id
  }

  pub fn remaining(&self) -> usize {
    self.queue.count() - self.next_proc_id as usize
  }
}

/// Starts a late-materialization compile: parses and builds the queue
/// iterator but produces no proc ads until the caller pulls them.
pub fn submit_late(
  text: &str,
  base: &ConfigSnapshot,
  cluster_id: i32,
) -> Result<LateSubmit, SubmitError> {
  let description = parse::parse(text)?;
  let view = file_view(base, &description.statements);
  let queue = queue_iter::build(&description.queue)?;
  Ok(LateSubmit {
    view,
    universe: description.universe,
    statements: description.statements,
    queue,
    cluster_id,
    next_proc_id: 0,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use condor_client::classad::Value;

  #[test]
  fn simple_submit_single_proc() {
    let base = ConfigSnapshot::new();
    let result = submit(
      "universe = vanilla\nexecutable = /bin/true\nqueue\n",
      &base,
      42,
    )
    .unwrap();
    assert_eq!(result.num_procs, 1);
    assert_eq!(result.proc_ads[0].evaluate("JobUniverse"), Value::Integer(5));
    assert_eq!(result.proc_ads[0].evaluate("Cmd"), Value::String("/bin/true".to_string()));
    assert_eq!(result.proc_ads[0].evaluate("ClusterId"), Value::Integer(42));
    assert_eq!(
      result.cluster_ad.evaluate("ProcId"),
      Value::Integer(condor_client::job::JobId::CLUSTER_TEMPLATE_PROC as i64)
    );
  }

  #[test]
  fn inline_list_queue_binds_item_index_in_order() {
    let base = ConfigSnapshot::new();
    let result = submit(
      "executable = /bin/echo\narguments = $(name)\nqueue name in (Alice, Bob, Charlie)\n",
      &base,
      1,
    )
    .unwrap();
    assert_eq!(result.num_procs, 3);
    for (i, ad) in result.proc_ads.iter().enumerate() {
      assert_eq!(ad.evaluate("ItemIndex"), Value::Integer(i as i64));
    }
    assert_eq!(result.proc_ads[0].evaluate("Arguments"), Value::String("Alice".to_string()));
    assert_eq!(result.proc_ads[2].evaluate("Arguments"), Value::String("Charlie".to_string()));
  }

  #[test]
  fn eager_and_late_submit_produce_identical_ads() {
    let base = ConfigSnapshot::new();
    let text = "executable = /bin/echo\narguments = $(name)\nqueue 2 name in (Alice, Bob)\n";
    let eager = submit(text, &base, 7).unwrap();
    let late: Vec<_> = submit_late(text, &base, 7).unwrap().collect();
    assert_eq!(eager.proc_ads, late);
  }
}
