//! Kernel-side filter that drops notifications caused by our own commands.
//!
//! Both sockets talk to the same rtnetlink subsystem, so every change made
//! through the command socket is echoed to the event socket. A classic BPF
//! program attached to the event socket rejects messages whose header port id
//! equals the command socket's, except route add/delete which are always let
//! through for inspection higher up.

use std::io;
use std::os::unix::io::RawFd;

use super::message::NlMsgType;

// Classic BPF opcodes (linux/filter.h).
const BPF_LD: u16 = 0x00;
const BPF_JMP: u16 = 0x05;
const BPF_RET: u16 = 0x06;
const BPF_W: u16 = 0x00;
const BPF_H: u16 = 0x08;
const BPF_ABS: u16 = 0x20;
const BPF_JEQ: u16 = 0x10;
const BPF_K: u16 = 0x00;

/// Offset of `nlmsg_type` in the header.
const TYPE_OFFSET: u32 = 4;
/// Offset of `nlmsg_pid` in the header.
const PID_OFFSET: u32 = 12;

/// Return value that drops the packet.
const DROP: u32 = 0;
/// Return value that keeps the whole packet.
const ACCEPT: u32 = 0xffff;

fn stmt(code: u16, k: u32) -> libc::sock_filter {
    libc::sock_filter {
        code,
        jt: 0,
        jf: 0,
        k,
    }
}

fn jump(code: u16, k: u32, jt: u8, jf: u8) -> libc::sock_filter {
    libc::sock_filter { code, jt, jf, k }
}

/// Build the self-traffic filter for a command socket with port id `pid`.
///
/// BPF absolute loads read in network byte order, while netlink headers are
/// host order, so the constants compared against are byte-swapped to match.
pub fn self_traffic_program(pid: u32) -> [libc::sock_filter; 7] {
    [
        // A = nlmsg_type
        stmt(BPF_LD | BPF_ABS | BPF_H, TYPE_OFFSET),
        // route add/delete: accept
        jump(
            BPF_JMP | BPF_JEQ | BPF_K,
            u32::from(NlMsgType::RTM_NEWROUTE.to_be()),
            4,
            0,
        ),
        jump(
            BPF_JMP | BPF_JEQ | BPF_K,
            u32::from(NlMsgType::RTM_DELROUTE.to_be()),
            3,
            0,
        ),
        // A = nlmsg_pid
        stmt(BPF_LD | BPF_ABS | BPF_W, PID_OFFSET),
        jump(BPF_JMP | BPF_JEQ | BPF_K, pid.to_be(), 0, 1),
        stmt(BPF_RET | BPF_K, DROP),
        stmt(BPF_RET | BPF_K, ACCEPT),
    ]
}

/// Attach the self-traffic filter to `fd`.
pub fn install(fd: RawFd, pid: u32) -> io::Result<()> {
    let mut program = self_traffic_program(pid);
    let fprog = libc::sock_fprog {
        len: program.len() as libc::c_ushort,
        filter: program.as_mut_ptr(),
    };

    // SAFETY: fprog points at `program`, which outlives the call; the kernel
    // copies the program during setsockopt.
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_ATTACH_FILTER,
            (&fprog as *const libc::sock_fprog).cast(),
            std::mem::size_of::<libc::sock_fprog>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
