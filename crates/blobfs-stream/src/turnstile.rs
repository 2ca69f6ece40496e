//! 呼び出し順の直列化
//!
//! 操作を呼び出した時点で整理券を配り、番号順に 1 つずつ実行させる。
//! future がポーリングされる順番ではなく、呼び出した順番が実行順になる。
//!
//! ```text
//! write(A) → 整理券 0 ─┐
//! write(B) → 整理券 1 ─┼─▶ 0 完了 → 1 を起こす → 1 完了 → 2 を起こす …
//! close()  → 整理券 2 ─┘
//! ```
//!
//! 順番が来る前に破棄された整理券は欠番として飛ばす。

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

#[derive(Default)]
struct State {
    next_ticket: u64,
    now_serving: u64,
    /// 順番が来る前に破棄された整理券
    abandoned: BTreeSet<u64>,
    /// 順番待ちのタスク
    waiters: BTreeMap<u64, Waker>,
}

#[derive(Default)]
pub(crate) struct Turnstile {
    state: RefCell<State>,
}

impl Turnstile {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// 整理券を発行する（同期的に番号が確定する）
    pub(crate) fn take(self: &Rc<Self>) -> Ticket {
        let mut state = self.state.borrow_mut();
        let number = state.next_ticket;
        state.next_ticket += 1;
        Ticket {
            number,
            turnstile: Rc::clone(self),
        }
    }

    /// 完了していない整理券の数
    pub(crate) fn pending(&self) -> u64 {
        let state = self.state.borrow();
        state.next_ticket - state.now_serving - state.abandoned.len() as u64
    }

    fn release(&self, number: u64) {
        let waker = {
            let mut state = self.state.borrow_mut();
            if number != state.now_serving {
                state.abandoned.insert(number);
                state.waiters.remove(&number);
                return;
            }
            state.now_serving += 1;
            loop {
                let serving = state.now_serving;
                if !state.abandoned.remove(&serving) {
                    break;
                }
                state.now_serving += 1;
            }
            let serving = state.now_serving;
            state.waiters.remove(&serving)
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }
}

/// 整理券。破棄されると次の番号に順番が移る
pub(crate) struct Ticket {
    number: u64,
    turnstile: Rc<Turnstile>,
}

impl Ticket {
    /// 自分の順番が来るまで待つ
    pub(crate) fn wait(&self) -> WaitTurn<'_> {
        WaitTurn { ticket: self }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.turnstile.release(self.number);
    }
}

pub(crate) struct WaitTurn<'a> {
    ticket: &'a Ticket,
}

impl Future for WaitTurn<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut state = self.ticket.turnstile.state.borrow_mut();
        if state.now_serving == self.ticket.number {
            Poll::Ready(())
        } else {
            state.waiters.insert(self.ticket.number, cx.waker().clone());
            Poll::Pending
        }
    }
}
