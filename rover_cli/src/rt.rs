//! Real-time scheduling for the control thread (Linux SCHED_FIFO / affinity /
//! mlockall; macOS mlockall only).
//!
//! Every step is best effort: a refusal is logged and the loop still runs,
//! just with more jitter.

use std::sync::OnceLock;

use crate::cli::{RtArgs, RtLock};

static RT_ONCE: OnceLock<()> = OnceLock::new();

/// Apply the requested real-time settings once per process.
pub fn setup_rt_once(args: &RtArgs) {
    if !args.rt {
        return;
    }
    let lock = args.rt_lock.unwrap_or_else(RtLock::os_default);
    RT_ONCE.get_or_init(|| {
        match lock_memory(lock) {
            Ok(()) => tracing::info!(?lock, "rt: memory lock applied"),
            Err(e) => tracing::warn!(error = %e, "rt: mlockall failed"),
        }
        platform::apply(args.rt_prio, args.rt_cpu);
    });
}

#[cfg(unix)]
fn lock_memory(lock: RtLock) -> eyre::Result<()> {
    use libc::{MCL_CURRENT, MCL_FUTURE, mlockall};

    fn call(flags: libc::c_int) -> std::io::Result<()> {
        // SAFETY: mlockall takes only flag bits and has no memory-safety preconditions.
        let rc = unsafe { mlockall(flags) };
        if rc == 0 {
            Ok(())
        } else {
            Err(std::io::Error::last_os_error())
        }
    }

    let result = match lock {
        RtLock::None => return Ok(()),
        RtLock::Current => call(MCL_CURRENT),
        RtLock::All => call(MCL_CURRENT | MCL_FUTURE),
    };
    let Err(err) = result else {
        return Ok(());
    };
    let retryable = matches!(err.raw_os_error(), Some(c) if c == libc::EPERM || c == libc::ENOMEM);
    // Locking future pages is the likeliest to exceed the memlock limit.
    if lock == RtLock::All && retryable && call(MCL_CURRENT).is_ok() {
        tracing::warn!(error = %err, "rt: mlockall(current|future) refused, locked current pages only");
        return Ok(());
    }
    let mut msg = format!("mlockall failed: {err}");
    if retryable {
        if let Some(limit) = memlock_limit_kib() {
            msg.push_str(&format!("; memlock limit: {limit}"));
        }
        msg.push_str("; needs CAP_IPC_LOCK (or root) and a sufficient 'ulimit -l'");
    }
    Err(eyre::eyre!(msg))
}

#[cfg(not(unix))]
fn lock_memory(lock: RtLock) -> eyre::Result<()> {
    match lock {
        RtLock::None => Ok(()),
        _ => Err(eyre::eyre!("memory locking is not supported on this platform")),
    }
}

#[cfg(unix)]
fn memlock_limit_kib() -> Option<String> {
    let mut rlim = std::mem::MaybeUninit::<libc::rlimit>::uninit();
    // SAFETY: getrlimit writes a full rlimit into the pointer on success.
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, rlim.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    // SAFETY: rc == 0 means the struct was initialized.
    let cur = unsafe { rlim.assume_init() }.rlim_cur;
    Some(if cur == libc::RLIM_INFINITY {
        "unlimited".to_string()
    } else {
        format!("{} KiB", cur / 1024)
    })
}

#[cfg(target_os = "linux")]
mod platform {
    use libc::{
        CPU_ISSET, CPU_SET, CPU_ZERO, SCHED_FIFO, cpu_set_t, sched_get_priority_max,
        sched_get_priority_min, sched_param, sched_setscheduler,
    };

    /// Capacity of `cpu_set_t` in CPU indices.
    const MAX_CPUSET_BITS: usize = std::mem::size_of::<cpu_set_t>() * 8;
    /// CAP_SYS_NICE bit in the /proc capability masks.
    const CAP_SYS_NICE: u64 = 1 << 23;

    pub fn apply(prio: Option<i32>, cpu: Option<usize>) {
        match fifo(prio) {
            Ok(p) => tracing::info!(priority = p, "rt: SCHED_FIFO applied"),
            Err(e) => tracing::warn!(error = %e, "rt: SCHED_FIFO not applied"),
        }
        let target = cpu.unwrap_or(0);
        match pin(target) {
            Ok(()) => tracing::info!(cpu = target, "rt: pinned to cpu"),
            Err(e) => tracing::warn!(error = %e, "rt: affinity not applied"),
        }
    }

    fn has_sys_nice() -> bool {
        let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
            return false;
        };
        status
            .lines()
            .filter(|l| l.starts_with("CapEff:"))
            .filter_map(|l| l.split_whitespace().nth(1))
            .filter_map(|hex| u64::from_str_radix(hex, 16).ok())
            .any(|caps| caps & CAP_SYS_NICE != 0)
    }

    fn fifo(prio: Option<i32>) -> eyre::Result<i32> {
        // SAFETY: geteuid has no preconditions.
        let euid = unsafe { libc::geteuid() };
        if euid != 0 && !has_sys_nice() {
            eyre::bail!(
                "SCHED_FIFO needs CAP_SYS_NICE or root (euid {euid}); try 'sudo setcap cap_sys_nice=ep /path/to/rover'"
            );
        }
        // SAFETY: plain queries on a valid policy constant.
        let (min, max) = unsafe {
            (
                sched_get_priority_min(SCHED_FIFO),
                sched_get_priority_max(SCHED_FIFO),
            )
        };
        let (min, max) = if min < 0 || max < 0 { (1, 99) } else { (min, max) };
        let wanted = prio.unwrap_or(max).clamp(min, max);
        let param = sched_param {
            sched_priority: wanted,
        };
        // SAFETY: pid 0 is the calling thread; param outlives the call.
        let rc = unsafe { sched_setscheduler(0, SCHED_FIFO, &param) };
        if rc != 0 {
            return Err(eyre::eyre!(std::io::Error::last_os_error()));
        }
        Ok(wanted)
    }

    fn pin(target: usize) -> eyre::Result<()> {
        if target >= MAX_CPUSET_BITS {
            eyre::bail!("cpu {target} exceeds cpu_set_t capacity {MAX_CPUSET_BITS}");
        }
        // SAFETY: sysconf has no preconditions.
        let online = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
        if online < 1 || target as libc::c_long >= online {
            eyre::bail!("cpu {target} is not online ({online} online)");
        }
        // SAFETY: an all-zero cpu_set_t is a valid empty set; the pointers
        // passed below refer to live locals of the right size.
        unsafe {
            let mut allowed: cpu_set_t = std::mem::zeroed();
            CPU_ZERO(&mut allowed);
            if libc::sched_getaffinity(0, std::mem::size_of::<cpu_set_t>(), &mut allowed) == 0
                && !CPU_ISSET(target, &allowed)
            {
                eyre::bail!("cpu {target} not permitted by the current affinity mask");
            }
            let mut desired: cpu_set_t = std::mem::zeroed();
            CPU_ZERO(&mut desired);
            CPU_SET(target, &mut desired);
            if libc::sched_setaffinity(0, std::mem::size_of::<cpu_set_t>(), &desired) != 0 {
                return Err(eyre::eyre!(std::io::Error::last_os_error()));
            }
        }
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
mod platform {
    pub fn apply(prio: Option<i32>, cpu: Option<usize>) {
        if prio.is_some() || cpu.is_some() {
            tracing::warn!("rt: SCHED_FIFO and affinity are only available on Linux; ignored");
        }
    }
}
