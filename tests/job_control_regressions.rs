use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Output, Stdio};
use std::thread;
use std::time::Duration;

/// A running shell driven line by line, the way a test driver would.
struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    seen: String,
}

impl Session {
    fn start() -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_tsh"))
            .arg("-p")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn tsh");
        let stdin = child.stdin.take().expect("stdin");
        let stdout = BufReader::new(child.stdout.take().expect("stdout"));
        Self {
            child,
            stdin,
            stdout,
            seen: String::new(),
        }
    }

    fn send(&mut self, line: &str) -> &mut Self {
        writeln!(self.stdin, "{line}").expect("write line");
        self.stdin.flush().expect("flush");
        self
    }

    /// Deliver `signal` to the shell process itself, as a terminal would.
    fn signal(&mut self, signal: libc::c_int) -> &mut Self {
        let rc = unsafe { libc::kill(self.child.id() as libc::pid_t, signal) };
        assert_eq!(rc, 0, "kill failed");
        self
    }

    fn pause(&mut self, millis: u64) -> &mut Self {
        thread::sleep(Duration::from_millis(millis));
        self
    }

    /// Block until the shell prints its next line. The line is kept as part
    /// of the final output too.
    fn read_line(&mut self) -> String {
        let mut line = String::new();
        self.stdout.read_line(&mut line).expect("read line");
        self.seen.push_str(&line);
        line
    }

    fn finish(mut self) -> Output {
        let _ = writeln!(self.stdin, "quit");
        drop(self.stdin);
        let mut rest = self.seen.into_bytes();
        self.stdout.read_to_end(&mut rest).expect("read output");
        let status = self.child.wait().expect("wait");
        Output {
            status,
            stdout: rest,
            stderr: Vec::new(),
        }
    }
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Pull the pid out of a `[jid] (pid) ...` line.
fn pid_in(line: &str) -> libc::pid_t {
    let start = line.find('(').expect("open paren") + 1;
    let end = line.find(')').expect("close paren");
    line[start..end].parse().expect("pid")
}

#[test]
fn background_launch_prints_acknowledgement_and_lists_running() {
    let mut session = Session::start();
    session.send("sleep 1 &").pause(200).send("jobs");
    let stdout = stdout_of(&session.finish());

    let lines: Vec<&str> = stdout.lines().collect();
    assert!(lines[0].starts_with("[1] ("), "stdout was: {stdout}");
    assert!(lines[0].ends_with(") sleep 1 &"), "stdout was: {stdout}");
    let pid = pid_in(lines[0]);
    assert!(
        stdout.contains(&format!("[1] ({pid}) Running sleep 1 &")),
        "stdout was: {stdout}"
    );
}

#[test]
fn job_ids_are_smallest_free() {
    let mut session = Session::start();
    session
        .send("sleep 1 &")
        .send("sh -c 'exit 0' &")
        .pause(300)
        .send("sleep 1 &")
        .pause(200)
        .send("jobs");
    let stdout = stdout_of(&session.finish());

    let listed: Vec<&str> = stdout.lines().filter(|l| l.contains("Running")).collect();
    assert_eq!(listed.len(), 2, "stdout was: {stdout}");
    assert!(listed[0].starts_with("[1] "), "stdout was: {stdout}");
    assert!(listed[1].starts_with("[2] "), "stdout was: {stdout}");
}

#[test]
fn jobs_with_nothing_running_prints_nothing() {
    let mut session = Session::start();
    session.send("jobs");
    let output = session.finish();
    assert_eq!(stdout_of(&output), "");
    assert!(output.status.success());
}

#[test]
fn interrupt_terminates_the_foreground_job() {
    let mut session = Session::start();
    session
        .send("sleep 5")
        .pause(300)
        .signal(libc::SIGINT)
        .pause(200)
        .send("jobs")
        .send("echo ALIVE");
    let stdout = stdout_of(&session.finish());

    assert!(stdout.starts_with("Job [1] ("), "stdout was: {stdout}");
    assert!(stdout.contains(") terminated by signal 2"), "stdout was: {stdout}");
    assert_eq!(stdout.matches("terminated by signal").count(), 1, "stdout was: {stdout}");
    assert!(!stdout.contains("sleep 5"), "stdout was: {stdout}");
    assert!(stdout.contains("ALIVE"), "stdout was: {stdout}");
}

#[test]
fn interrupt_reaches_every_stage_of_a_pipeline() {
    let mut session = Session::start();
    session
        .send("sleep 5 | sleep 5")
        .pause(300)
        .signal(libc::SIGINT)
        .pause(200)
        .send("echo ALIVE");
    let output = session.finish();
    let stdout = stdout_of(&output);
    assert!(stdout.contains("terminated by signal 2"), "stdout was: {stdout}");
    assert!(stdout.contains("ALIVE"), "stdout was: {stdout}");
}

#[test]
fn interrupt_without_a_foreground_job_is_ignored() {
    let mut session = Session::start();
    session.pause(200).signal(libc::SIGINT).pause(100).send("echo ALIVE");
    let output = session.finish();
    assert_eq!(stdout_of(&output).trim(), "ALIVE");
    assert!(output.status.success());
}

#[test]
fn suspend_stops_the_foreground_job_and_fg_resumes_it() {
    let mut session = Session::start();
    session
        .send("sleep 5")
        .pause(300)
        .signal(libc::SIGTSTP)
        .pause(200)
        .send("jobs")
        .send("fg %1")
        .pause(300)
        .signal(libc::SIGINT)
        .pause(200)
        .send("jobs");
    let stdout = stdout_of(&session.finish());

    let stopped = format!("stopped by signal {}", libc::SIGTSTP);
    assert!(stdout.contains(&stopped), "stdout was: {stdout}");
    assert_eq!(stdout.matches(&stopped).count(), 1, "stdout was: {stdout}");
    assert!(stdout.contains(") Stopped sleep 5"), "stdout was: {stdout}");
    assert!(stdout.contains("terminated by signal 2"), "stdout was: {stdout}");
    assert_eq!(stdout.matches("sleep 5").count(), 1, "stdout was: {stdout}");
}

#[test]
fn bg_resumes_a_stopped_job_in_the_background() {
    let mut session = Session::start();
    session
        .send("sleep 1")
        .pause(300)
        .signal(libc::SIGTSTP)
        .pause(200)
        .send("bg %1")
        .send("jobs")
        .send("bg %1");
    let stdout = stdout_of(&session.finish());

    let ack: Vec<&str> = stdout.lines().filter(|l| l.ends_with(") sleep 1")).collect();
    assert_eq!(ack.len(), 1, "second bg must be a no-op; stdout was: {stdout}");
    assert!(ack[0].starts_with("[1] ("), "stdout was: {stdout}");
    let pid = pid_in(ack[0]);
    assert!(
        stdout.contains(&format!("[1] ({pid}) Running sleep 1")),
        "stdout was: {stdout}"
    );
}

#[test]
fn fg_brings_a_background_job_forward() {
    let mut session = Session::start();
    session
        .send("sleep 5 &")
        .pause(200)
        .send("fg %1")
        .pause(300)
        .signal(libc::SIGINT)
        .pause(200)
        .send("jobs");
    let stdout = stdout_of(&session.finish());

    let first = stdout.lines().next().unwrap_or_default();
    let pid = pid_in(first);
    assert!(
        stdout.contains(&format!("Job [1] ({pid}) terminated by signal 2")),
        "stdout was: {stdout}"
    );
    assert!(!stdout.contains("Running"), "stdout was: {stdout}");
}

#[test]
fn fg_and_bg_accept_a_bare_pid() {
    let mut session = Session::start();
    session.send("sleep 5 &");
    let pid = pid_in(&session.read_line());
    session
        .send(&format!("bg {pid}"))
        .send(&format!("fg {pid}"))
        .pause(300)
        .signal(libc::SIGINT)
        .pause(200)
        .send("jobs");
    let stdout = stdout_of(&session.finish());

    assert!(
        stdout.contains(&format!("Job [1] ({pid}) terminated by signal 2")),
        "stdout was: {stdout}"
    );
    assert!(!stdout.contains("Running"), "stdout was: {stdout}");
}

#[test]
fn pids_from_another_shell_are_unknown() {
    let mut other = Session::start();
    other.send("sleep 1 &");
    let pid = pid_in(&other.read_line());

    let mut session = Session::start();
    session.send(&format!("fg {pid}"));
    let stdout = stdout_of(&session.finish());
    assert_eq!(stdout.trim(), format!("({pid}): No such process"));
    drop(other.finish());
}

#[test]
fn external_stop_signal_is_reported_by_the_reaper() {
    let mut session = Session::start();
    session
        .send("sh -c 'kill -STOP $$; true'")
        .pause(300)
        .send("jobs")
        .send("fg %1");
    let stdout = stdout_of(&session.finish());

    let stopped = format!("stopped by signal {}", libc::SIGSTOP);
    assert!(stdout.contains(&stopped), "stdout was: {stdout}");
    assert!(stdout.contains("Stopped sh -c 'kill -STOP $$; true'"), "stdout was: {stdout}");
}

#[test]
fn abnormal_background_death_is_reported() {
    let mut session = Session::start();
    session.send("sh -c 'kill -TERM $$' &").pause(300).send("jobs");
    let stdout = stdout_of(&session.finish());
    let notice = format!("terminated by signal {}", libc::SIGTERM);
    assert!(stdout.contains(&notice), "stdout was: {stdout}");
    assert!(!stdout.contains("Running"), "stdout was: {stdout}");
}

#[test]
fn background_death_during_a_foreground_wait_is_reported_afterwards() {
    let mut session = Session::start();
    session
        .send("sh -c 'sleep 0.1; kill -TERM $$' &")
        .send("sleep 0.6")
        .pause(900)
        .send("jobs")
        .send("echo AFTER");
    let stdout = stdout_of(&session.finish());

    let ended = format!("terminated by signal {}", libc::SIGTERM);
    assert_eq!(stdout.matches(&ended).count(), 1, "stdout was: {stdout}");
    assert!(stdout.contains("Job [1] ("), "stdout was: {stdout}");
    assert!(!stdout.contains("Running"), "stdout was: {stdout}");
    let notice_at = stdout.find(&ended).unwrap_or_default();
    let after_at = stdout.find("AFTER").unwrap_or_default();
    assert!(notice_at < after_at, "stdout was: {stdout}");
}

#[test]
fn bg_and_fg_argument_errors() {
    let mut session = Session::start();
    session
        .send("fg")
        .send("bg")
        .send("fg abc")
        .send("bg %x")
        .send("fg %7")
        .send("bg 99999999");
    let stdout = stdout_of(&session.finish());

    let expected = [
        "fg command requires PID or %jobid argument",
        "bg command requires PID or %jobid argument",
        "fg: argument must be a PID or %jobid",
        "bg: argument must be a PID or %jobid",
        "%7: No such job",
        "(99999999): No such process",
    ];
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, expected, "stdout was: {stdout}");
}

#[test]
fn full_job_table_refuses_new_jobs() {
    let mut session = Session::start();
    for _ in 0..16 {
        session.send("sleep 1 &");
    }
    session.send("sleep 1 &").pause(100).send("jobs");
    let stdout = stdout_of(&session.finish());

    assert!(stdout.contains("Tried to create too many jobs"), "stdout was: {stdout}");
    assert_eq!(stdout.lines().filter(|l| l.contains(") Running ")).count(), 16);
    assert!(stdout.contains("[16] ("), "stdout was: {stdout}");
    assert!(!stdout.contains("[17]"), "stdout was: {stdout}");
}

#[test]
fn quit_signal_terminates_the_shell() {
    let mut session = Session::start();
    session.pause(200).signal(libc::SIGQUIT).pause(100);
    let output = session.finish();
    assert!(
        stdout_of(&output).contains("Terminating after receipt of SIGQUIT signal"),
        "stdout was: {}",
        stdout_of(&output)
    );
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn shell_survives_suspend_at_the_prompt() {
    let mut session = Session::start();
    session.pause(200).signal(libc::SIGTSTP).pause(100).send("echo ALIVE");
    let output = session.finish();
    assert_eq!(stdout_of(&output).trim(), "ALIVE");
}
