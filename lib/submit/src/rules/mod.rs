//! The fixed rule table (§4.5 step 2) that turns one macro frame plus a
//! per-proc config view into a proc `ClassAd`. Rules run in a fixed
//! group order so `Requirements` composition can see attributes the
//! earlier groups already set.

use condor_client::{
  classad::{BinaryOp, ClassAd, Expr, Value, parse_expr},
  config::ConfigSnapshot,
  submit::Universe,
};

use crate::{MacroFrame, custom_attrs};

/// Builds one proc ad from `view` (the per-proc config view, already
/// layered with the macro frame's bound variables) and `frame`.
pub fn build_ad(
  view: &ConfigSnapshot,
  universe: Universe,
  frame: &MacroFrame,
  statements: &[(String, String)],
) -> ClassAd {
  let mut ad = ClassAd::new();

  ad.insert("JobUniverse", universe.job_universe_code());
  ad.insert("ClusterId", frame.cluster_id);
  ad.insert("ProcId", frame.proc_id);
  ad.insert("Cluster", frame.cluster_id as i64);
  ad.insert("Process", frame.proc_id as i64);
  ad.insert("Node", frame.node as i64);
  ad.insert("ItemIndex", frame.item_index as i64);
  ad.insert("Step", frame.step as i64);
  ad.insert("Row", frame.row as i64);
  if !frame.item.is_empty() {
    ad.insert("Item", frame.item.as_str());
  }

  executable_args_env(&mut ad, view);
  stdio_and_log(&mut ad, view);
  let transferring = file_transfer(&mut ad, view);
  container_settings(&mut ad, view, universe);
  requirements(&mut ad, view, universe, transferring);
  resource_requests(&mut ad, view);
  notification(&mut ad, view);
  rank(&mut ad, view);
  ownership(&mut ad, view);
  status_and_control(&mut ad, view);
  custom_attributes(&mut ad, view, statements);
  universe_specific(&mut ad, view, universe);
  scheduling_expressions(&mut ad, view);
  signal_handling(&mut ad, view);
  auto_counters(&mut ad);
  transfer_flag_defaults(&mut ad, view);

  ad
}

fn get(view: &ConfigSnapshot, key: &str) -> Option<String> {
  let (value, present) = view.get(key);
  present.then_some(value)
}

fn get_or(view: &ConfigSnapshot, key: &str, default: &str) -> String {
  get(view, key).unwrap_or_else(|| default.to_string())
}

fn is_yes(s: &str) -> bool {
  matches!(s.trim().to_ascii_lowercase().as_str(), "yes" | "true" | "1")
}

fn is_no(s: &str) -> bool {
  matches!(s.trim().to_ascii_lowercase().as_str(), "no" | "false" | "0")
}

fn executable_args_env(ad: &mut ClassAd, view: &ConfigSnapshot) {
  if let Some(exe) = get(view, "executable") {
    ad.insert("Cmd", exe);
  }
  if let Some(args) = get(view, "arguments") {
    ad.insert("Arguments", args);
  }
  if let Some(env) = get(view, "environment") {
    ad.insert("Env", env);
  }
  ad.insert("GetEnv", is_yes(&get_or(view, "getenv", "no")));
}

fn stdio_and_log(ad: &mut ClassAd, view: &ConfigSnapshot) {
  ad.insert("In", get_or(view, "input", "/dev/null"));
  ad.insert("Out", get_or(view, "output", "/dev/null"));
  ad.insert("Err", get_or(view, "error", "/dev/null"));
  if let Some(log) = get(view, "log") {
    ad.insert("UserLog", log);
  }
  ad.insert("StreamOut", is_yes(&get_or(view, "stream_output", "no")));
  ad.insert("StreamErr", is_yes(&get_or(view, "stream_error", "no")));
}

/// Populates the file-transfer flags and lists; returns whether input or
/// output transfer is active at all, which `Requirements` composition
/// consults below.
fn file_transfer(ad: &mut ClassAd, view: &ConfigSnapshot) -> bool {
  let should_transfer = get_or(view, "should_transfer_files", "IF_NEEDED").to_uppercase();
  ad.insert("ShouldTransferFiles", should_transfer.clone());
  ad.insert(
    "WhenToTransferOutput",
    get_or(view, "when_to_transfer_output", "ON_EXIT").to_uppercase(),
  );

  let mut transferring = should_transfer != "NO";
  if let Some(input_files) = get(view, "transfer_input_files") {
    ad.insert("TransferInputFiles", input_files);
    transferring = true;
  }
  if let Some(output_files) = get(view, "transfer_output_files") {
    ad.insert("TransferOutputFiles", output_files);
    transferring = true;
  }
  if let Some(remaps) = get(view, "transfer_output_remaps") {
    ad.insert("TransferOutputRemaps", remaps);
  }
  transferring
}

fn container_settings(ad: &mut ClassAd, view: &ConfigSnapshot, universe: Universe) {
  if let Some(image) = get(view, "container_image") {
    ad.insert("ContainerImage", image);
    ad.insert("WantContainer", true);
  }
  if universe == Universe::Docker
    && let Some(image) = get(view, "docker_image")
  {
    ad.insert("DockerImage", image);
  }
  if let Some(network) = get(view, "container_service_names") {
    ad.insert("ContainerServiceNames", network);
  }
}

/// `Requirements` composition (§4.5): left-to-right conjunction of
/// whichever clauses apply.
fn requirements(
  ad: &mut ClassAd,
  view: &ConfigSnapshot,
  universe: Universe,
  transferring: bool,
) {
  let mut clauses: Vec<Expr> = Vec::new();

  if let Some(user_expr) = get(view, "requirements")
    && let Ok(expr) = parse_expr(&user_expr)
  {
    clauses.push(expr);
  }

  if universe != Universe::Grid {
    clauses.push(meta_ne(Expr::attr("TARGET.Arch"), Expr::Undefined));
    clauses.push(meta_ne(Expr::attr("TARGET.OpSys"), Expr::Undefined));
  }

  if transferring {
    clauses.push(ge(Expr::attr("TARGET.Disk"), Expr::attr("RequestDisk")));
  }
  clauses.push(ge(Expr::attr("TARGET.Memory"), Expr::attr("RequestMemory")));
  clauses.push(ge(Expr::attr("TARGET.Cpus"), Expr::attr("RequestCpus")));

  if let Some(gpus) = get(view, "request_gpus")
    && gpus.trim().parse::<i64>().is_ok_and(|n| n > 0)
  {
    clauses.push(ge(Expr::attr("TARGET.Gpus"), Expr::attr("RequestGpus")));
  }

  if let Some(arch) = get(view, "arch") {
    clauses.push(eq(Expr::attr("TARGET.Arch"), Expr::Str(arch)));
  }
  if let Some(opsys) = get(view, "opsys") {
    clauses.push(eq(Expr::attr("TARGET.OpSys"), Expr::Str(opsys)));
  }

  if ad.contains("ContainerImage") {
    clauses.push(meta_eq(Expr::attr("TARGET.HasContainer"), Expr::Bool(true)));
  }

  if let Some(domain) = get(view, "requirements_filesystem_domain")
    && is_yes(&domain)
  {
    clauses.push(eq(
      Expr::attr("TARGET.FileSystemDomain"),
      Expr::attr("MY.FileSystemDomain"),
    ));
  }

  if transferring {
    clauses.push(meta_eq(Expr::attr("TARGET.HasFileTransfer"), Expr::Bool(true)));
  }

  let combined = clauses
    .into_iter()
    .reduce(|acc, clause| acc.and(clause))
    .unwrap_or(Expr::Bool(true));
  ad.insert("Requirements", combined);
}

fn meta_ne(lhs: Expr, rhs: Expr) -> Expr {
  Expr::Binary(BinaryOp::MetaNe, Box::new(lhs), Box::new(rhs))
}
fn meta_eq(lhs: Expr, rhs: Expr) -> Expr {
  Expr::Binary(BinaryOp::MetaEq, Box::new(lhs), Box::new(rhs))
}
fn ge(lhs: Expr, rhs: Expr) -> Expr {
  Expr::Binary(BinaryOp::Ge, Box::new(lhs), Box::new(rhs))
}
fn eq(lhs: Expr, rhs: Expr) -> Expr {
  Expr::Binary(BinaryOp::Eq, Box::new(lhs), Box::new(rhs))
}

/// Resource requests, with defaults `(cpus=1, memory=128 MiB, disk=1
/// MiB)`; `RequestDisk` is expressed in KiB (§8 scenario 1: `disk=1 MiB`
/// → `RequestDisk=1024`).
fn resource_requests(ad: &mut ClassAd, view: &ConfigSnapshot) {
  ad.insert("RequestCpus", parse_i64_or(&get_or(view, "request_cpus", "1"), 1));
  ad.insert("RequestMemory", parse_i64_or(&get_or(view, "request_memory", "128"), 128));
  let disk_mib = parse_i64_or(&get_or(view, "request_disk", "1024"), 1024);
  ad.insert("RequestDisk", disk_mib);
  if let Some(gpus) = get(view, "request_gpus") {
    ad.insert("RequestGpus", parse_i64_or(&gpus, 0));
  }
}

fn parse_i64_or(s: &str, default: i64) -> i64 {
  s.trim().parse::<i64>().unwrap_or(default)
}

fn notification(ad: &mut ClassAd, view: &ConfigSnapshot) {
  let code = match get_or(view, "notification", "never").to_ascii_lowercase().as_str() {
    "always" => 0,
    "complete" => 1,
    "error" => 2,
    _ => 3,
  };
  ad.insert("Notification", code);
}

fn rank(ad: &mut ClassAd, view: &ConfigSnapshot) {
  match get(view, "rank") {
    Some(expr) => match parse_expr(&expr) {
      Ok(parsed) => ad.insert("Rank", parsed),
      Err(_) => ad.insert("Rank", 0.0),
    },
    None => ad.insert("Rank", 0.0),
  }
}

fn ownership(ad: &mut ClassAd, view: &ConfigSnapshot) {
  ad.insert("Owner", get_or(view, "owner", "submitter"));
  if let Some(group) = get(view, "accounting_group") {
    ad.insert("AcctGroup", group);
  }
  if let Some(user) = get(view, "accounting_group_user") {
    ad.insert("AcctGroupUser", user);
  }
}

fn status_and_control(ad: &mut ClassAd, view: &ConfigSnapshot) {
  ad.insert("JobStatus", 1i64); // Idle
  ad.insert("HoldKillSig", is_yes(&get_or(view, "hold", "no")));
  if let Some(expr) = get(view, "periodic_hold") {
    insert_expr_or_string(ad, "PeriodicHold", &expr);
  }
  if let Some(expr) = get(view, "periodic_release") {
    insert_expr_or_string(ad, "PeriodicRelease", &expr);
  }
  if let Some(expr) = get(view, "periodic_remove") {
    insert_expr_or_string(ad, "PeriodicRemove", &expr);
  }
  ad.insert("JobLeaseDuration", parse_i64_or(&get_or(view, "job_lease_duration", "1200"), 1200));
  ad.insert("OnExitRemove", true);
}

fn insert_expr_or_string(ad: &mut ClassAd, name: &str, raw: &str) {
  match parse_expr(raw) {
    Ok(expr) => ad.insert(name, expr),
    Err(_) => ad.insert(name, raw),
  }
}

fn custom_attributes(
  ad: &mut ClassAd,
  view: &ConfigSnapshot,
  statements: &[(String, String)],
) {
  for (key, _) in statements {
    if let Some(name) = custom_attrs::strip_prefix(key) {
      let expanded = get_or(view, key, "");
      ad.insert(name, custom_attrs::typed_value(&expanded));
    }
  }
}

fn universe_specific(ad: &mut ClassAd, view: &ConfigSnapshot, universe: Universe) {
  match universe {
    Universe::Grid => {
      if let Some(resource) = get(view, "grid_resource") {
        ad.insert("GridResource", resource);
      }
    }
    Universe::Vm => {
      ad.insert("VM_Type", get_or(view, "vm_type", "kvm"));
      if let Some(memory) = get(view, "vm_memory") {
        ad.insert("VM_Memory", parse_i64_or(&memory, 0));
      }
    }
    Universe::Parallel => {
      let machine_count = parse_i64_or(&get_or(view, "machine_count", "1"), 1);
      ad.insert("MinHosts", machine_count);
      ad.insert("MaxHosts", machine_count);
    }
    Universe::Java => {
      if let Some(jars) = get(view, "jar_files") {
        ad.insert("JarFiles", jars);
      }
    }
    _ => {}
  }
}

fn scheduling_expressions(ad: &mut ClassAd, view: &ConfigSnapshot) {
  if let Some(cron) = get(view, "cron_minute") {
    ad.insert("CronMinute", cron);
  }
  if let Some(expr) = get(view, "deferral_time") {
    insert_expr_or_string(ad, "DeferralTime", &expr);
  }
  if let Some(window) = get(view, "deferral_window") {
    ad.insert("DeferralWindow", parse_i64_or(&window, 0));
  }
}

fn signal_handling(ad: &mut ClassAd, view: &ConfigSnapshot) {
  if let Some(sig) = get(view, "kill_sig") {
    ad.insert("KillSig", sig);
  }
  if let Some(timeout) = get(view, "kill_sig_timeout") {
    ad.insert("KillSigTimeout", parse_i64_or(&timeout, 0));
  }
}

fn auto_counters(ad: &mut ClassAd) {
  ad.insert("NumJobStarts", 0i64);
  ad.insert("NumRestarts", 0i64);
  ad.insert("NumSystemHolds", 0i64);
  ad.insert("JobRunCount", 0i64);
  ad.insert("EnteredCurrentStatus", 0i64);
}

fn transfer_flag_defaults(ad: &mut ClassAd, view: &ConfigSnapshot) {
  if !ad.contains("CopyToSpool") {
    match get(view, "copy_to_spool") {
      Some(raw) if is_yes(&raw) => ad.insert("CopyToSpool", true),
      Some(raw) if is_no(&raw) => ad.insert("CopyToSpool", false),
      _ => ad.insert("CopyToSpool", Value::Undefined),
    }
  }
  if !ad.contains("EncryptInputFiles") {
    ad.insert("EncryptInputFiles", false);
  }
  if !ad.contains("EncryptOutputFiles") {
    ad.insert("EncryptOutputFiles", false);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use condor_client::{classad::Value, submit::Universe};

  fn frame() -> MacroFrame {
    MacroFrame {
      cluster_id: 100,
      proc_id: 0,
      node: 0,
      item_index: 0,
      item: String::new(),
      step: 0,
      row: 0,
      vars: Vec::new(),
    }
  }

  #[test]
  fn simple_submit_matches_scenario_one() {
    let mut view = ConfigSnapshot::new();
    view.set("executable", "/bin/true");
    let ad = build_ad(&view, Universe::Vanilla, &frame(), &[]);
    assert_eq!(ad.evaluate("JobUniverse"), Value::Integer(5));
    assert_eq!(ad.evaluate("Cmd"), Value::String("/bin/true".to_string()));
    assert_eq!(ad.evaluate("JobStatus"), Value::Integer(1));
    assert_eq!(ad.evaluate("RequestCpus"), Value::Integer(1));
    assert_eq!(ad.evaluate("RequestMemory"), Value::Integer(128));
    assert_eq!(ad.evaluate("RequestDisk"), Value::Integer(1024));
  }

  #[test]
  fn copy_to_spool_is_typed_boolean() {
    let mut yes = ConfigSnapshot::new();
    yes.set("copy_to_spool", "YES");
    let ad = build_ad(&yes, Universe::Vanilla, &frame(), &[]);
    assert_eq!(ad.evaluate("CopyToSpool"), Value::Boolean(true));

    let mut no = ConfigSnapshot::new();
    no.set("copy_to_spool", "No");
    let ad = build_ad(&no, Universe::Vanilla, &frame(), &[]);
    assert_eq!(ad.evaluate("CopyToSpool"), Value::Boolean(false));

    let empty = ConfigSnapshot::new();
    let ad = build_ad(&empty, Universe::Vanilla, &frame(), &[]);
    assert_eq!(ad.evaluate("CopyToSpool"), Value::Undefined);
  }

  #[test]
  fn requirements_compose_left_to_right() {
    let view = ConfigSnapshot::new();
    let ad = build_ad(&view, Universe::Vanilla, &frame(), &[]);
    let text = ad.lookup("Requirements").unwrap().to_text();
    assert!(text.contains("TARGET.Arch =!= UNDEFINED"));
    assert!(text.contains("TARGET.Memory >= RequestMemory"));
    assert!(text.contains("TARGET.Cpus >= RequestCpus"));
  }

  #[test]
  fn custom_attribute_typed_fallback_applies() {
    let mut view = ConfigSnapshot::new();
    let statements = vec![("+ProjectName".to_string(), "\"physics\"".to_string())];
    view.set("+ProjectName", "\"physics\"");
    let ad = build_ad(&view, Universe::Vanilla, &frame(), &statements);
    assert_eq!(ad.evaluate("ProjectName"), Value::String("physics".to_string()));
  }
}
