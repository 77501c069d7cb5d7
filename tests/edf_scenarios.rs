//! End-to-end EDF scenarios on the deterministic simulator.

use edfos::clock::VirtualClock;
use edfos::sim::Simulation;
use edfos::{
    Event, OverrunPolicy, Scheduler, SchedulerConfig, TaskConfig, TaskId, TaskState, Tick,
};

fn three_task_set() -> (Simulation, [TaskId; 3]) {
    let mut sim = Simulation::new(SchedulerConfig::new());
    let a = sim.add_periodic("t10", 10, 2).unwrap();
    let b = sim.add_periodic("t20", 20, 3).unwrap();
    let c = sim.add_periodic("t50", 50, 4).unwrap();
    sim.start().unwrap();
    (sim, [a, b, c])
}

fn overloaded(policy: OverrunPolicy) -> (Simulation, [TaskId; 2]) {
    // U = 0.6 + 0.5 = 1.1
    let mut sim = Simulation::new(SchedulerConfig::new().with_overrun_policy(policy));
    let short = sim.add_periodic("short", 10, 6).unwrap();
    let long = sim.add_periodic("long", 20, 10).unwrap();
    sim.start().unwrap();
    sim.run(200);
    (sim, [short, long])
}

#[test]
fn test_feasible_set_meets_every_deadline() {
    let (mut sim, tasks) = three_task_set();
    sim.run(1000);
    let s = sim.scheduler();

    let stats = s.stats();
    assert_eq!(stats.ticks, 1000);
    assert_eq!(stats.deadline_misses, 0);
    assert_eq!(sim.misses_seen(), 0);

    let expected = [(100, 200), (50, 150), (20, 80)];
    for (id, (jobs, exec)) in tasks.iter().zip(expected) {
        let tcb = s.task(*id).unwrap();
        assert_eq!(tcb.deadline_misses(), 0, "{}", tcb.name());
        assert_eq!(tcb.jobs_completed(), jobs, "{}", tcb.name());
        assert_eq!(tcb.execution_time(), exec, "{}", tcb.name());
    }
    assert_eq!(s.total_execution_time(), 430);
    assert!((43..=44).contains(&s.cpu_load()), "load {}", s.cpu_load());
    // Releases at tick 1000 included.
    assert_eq!(stats.releases, 101 + 51 + 21);
}

#[test]
fn test_running_task_has_minimum_rank() {
    let (mut sim, _) = three_task_set();
    sim.run_with(500, |s| {
        let running: Vec<_> = s.tasks().filter(|t| t.state() == TaskState::Running).collect();
        assert!(running.len() <= 1);
        assert_eq!(running.first().map(|t| t.id()), s.current());

        let best = s.tasks().filter(|t| t.is_runnable()).map(|t| t.rank()).min();
        let current = s.current().and_then(|id| s.task(id)).map(|t| t.rank());
        assert_eq!(current, best);
    });
}

#[test]
fn test_deadlines_do_not_drift() {
    let (mut sim, _) = three_task_set();
    sim.run_with(1000, |s| {
        for t in s.tasks().filter(|t| t.releases() > 0) {
            let job = (t.releases() - 1) as u64;
            assert_eq!(t.absolute_deadline(), job * t.period() + t.deadline());
            assert_eq!(t.release_time(), (job + 1) * t.period());
        }
    });
}

#[test]
fn test_constrained_deadline_is_met() {
    let mut sim = Simulation::new(SchedulerConfig::new());
    let tight = sim
        .add_task("tight", TaskConfig::periodic(10).with_deadline(4), 2)
        .unwrap();
    let loose = sim.add_periodic("loose", 20, 5).unwrap();
    sim.start().unwrap();
    sim.run(200);

    let s = sim.scheduler();
    assert_eq!(s.stats().deadline_misses, 0);
    assert_eq!(s.task(tight).unwrap().jobs_completed(), 20);
    assert_eq!(s.task(loose).unwrap().jobs_completed(), 10);
}

#[test]
fn test_equal_deadlines_run_in_id_order() {
    let mut sim = Simulation::new(SchedulerConfig::new());
    let first = sim.add_periodic("first", 10, 3).unwrap();
    let second = sim.add_periodic("second", 10, 3).unwrap();
    sim.start().unwrap();

    assert_eq!(sim.scheduler().current(), Some(first));
    sim.run(3);
    assert_eq!(sim.scheduler().current(), Some(second));
    sim.run(3);
    assert_eq!(sim.scheduler().current(), None);
    sim.run(4);
    assert_eq!(sim.scheduler().current(), Some(first));
}

#[test]
fn test_overload_abandon_records_misses() {
    let (sim, [short, long]) = overloaded(OverrunPolicy::Abandon);
    let s = sim.scheduler();

    let short = s.task(short).unwrap();
    let long = s.task(long).unwrap();
    assert_eq!(short.deadline_misses(), 0);
    assert_eq!(short.jobs_completed(), 20);
    assert_eq!(long.deadline_misses(), 10);
    // Late jobs are abandoned, never the task.
    assert!(long.execution_time() > 0);
    assert_eq!(long.releases(), 11);

    assert_eq!(s.stats().deadline_misses, 10);
    assert_eq!(sim.misses_seen(), 10);
    assert_eq!(s.cpu_load(), 100);
}

#[test]
fn test_overload_defer_finishes_late_jobs() {
    let (sim, [short, long]) = overloaded(OverrunPolicy::Defer);
    let s = sim.scheduler();

    let short = s.task(short).unwrap();
    let long = s.task(long).unwrap();
    assert!(short.deadline_misses() > 0);
    assert!(long.deadline_misses() > 0);
    assert!(short.jobs_completed() > 0);
    assert!(long.jobs_completed() > 0);

    let total = short.deadline_misses() + long.deadline_misses();
    assert_eq!(s.stats().deadline_misses, total);
    assert_eq!(sim.misses_seen(), total as u64);
}

#[test]
fn test_suspended_task_gets_no_cpu() {
    let mut sim = Simulation::new(SchedulerConfig::new());
    let a = sim.add_periodic("a", 10, 2).unwrap();
    let b = sim.add_periodic("b", 10, 2).unwrap();
    sim.start().unwrap();
    sim.run(20);

    sim.scheduler_mut().suspend(b).unwrap();
    let before = sim.scheduler().task(b).unwrap().execution_time();
    sim.run(50);
    let s = sim.scheduler();
    assert_eq!(s.task(b).unwrap().execution_time(), before);
    assert_eq!(s.task(b).unwrap().state(), TaskState::Suspended);
    assert_eq!(s.task(a).unwrap().jobs_completed(), 7);

    // now = 70 is a period boundary of b: released immediately.
    sim.scheduler_mut().resume(b).unwrap();
    let tcb = sim.scheduler().task(b).unwrap();
    assert_eq!(tcb.state(), TaskState::Ready);
    assert_eq!(tcb.absolute_deadline(), 80);
    sim.run(10);
    assert_eq!(sim.scheduler().task(b).unwrap().jobs_completed(), 3);
    assert_eq!(sim.scheduler().stats().deadline_misses, 0);
}

#[test]
fn test_execution_time_survives_clock_wrap() {
    extern "C" fn body(_: usize) -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    let mut s = Scheduler::new(VirtualClock::starting_at(u32::MAX - 5), SchedulerConfig::new());
    let a = s.create_task("a", body, TaskConfig::periodic(100)).unwrap();
    s.start().unwrap();

    for _ in 0..10 {
        s.clock_mut().advance(1);
        s.tick();
    }
    s.complete_job().unwrap();
    assert_eq!(s.task(a).unwrap().execution_time(), 10);
    assert_eq!(s.cpu_load(), 100);

    for _ in 0..10 {
        s.clock_mut().advance(1);
        s.tick();
    }
    assert_eq!(s.total_execution_time(), 10);
}

/// Step `ticks` ticks, draining the event ring every tick.
fn run_collecting_misses(s: &mut Scheduler<VirtualClock>, ticks: u64, missed: &mut Vec<Tick>) {
    for _ in 0..ticks {
        s.clock_mut().advance(1);
        s.tick();
        while let Some(event) = s.pop_event() {
            if let Event::DeadlineMiss { deadline, .. } = event {
                missed.push(deadline);
            }
        }
    }
}

#[test]
fn test_defer_counts_each_superseded_release() {
    extern "C" fn body(_: usize) -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    let config = SchedulerConfig::new().with_overrun_policy(OverrunPolicy::Defer);
    let mut s = Scheduler::new(VirtualClock::new(), config);
    let a = s.create_task("a", body, TaskConfig::periodic(10)).unwrap();
    s.start().unwrap();

    let mut missed = Vec::new();
    // Job 0 overruns the releases at 10 and 20; the one parked at 10 is lost.
    run_collecting_misses(&mut s, 25, &mut missed);
    assert_eq!(missed, [10, 20]);
    let tcb = s.task(a).unwrap();
    assert_eq!(tcb.deadline_misses(), 2);
    assert_eq!(tcb.absolute_deadline(), 10);
    assert_eq!(tcb.release_time(), 30);

    // Completing runs the release parked at 20 straight away.
    s.complete_job().unwrap();
    let tcb = s.task(a).unwrap();
    assert_eq!(tcb.state(), TaskState::Running);
    assert_eq!(tcb.absolute_deadline(), 30);
    assert_eq!(tcb.releases(), 2);
    assert_eq!(s.stats().releases, 2);

    run_collecting_misses(&mut s, 5, &mut missed);
    assert_eq!(missed, [10, 20, 30]);
    assert_eq!(s.stats().deadline_misses, 3);
}
