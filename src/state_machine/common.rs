// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

/// Result of stepping one state.
pub enum Transition<S, R> {
    /// Enter `S`, emit `R`, and step `S` again without waiting.
    Next(S, R),
    /// Enter `S`, emit `R`, and wait for the next event.
    Wait(S, R),
}

/// One state of a machine. A state consumes itself when stepped and
/// names its successor through the returned [`Transition`].
pub trait StateMachine<Ctx, Resp>: Sized {
    fn step(self, ctx: &mut Ctx) -> Resp;
}

/// The owner of a machine: feeds it one event at a time.
pub trait StateMachineCtx<Ev, Out = ()>: Sized {
    fn handle(&mut self, event: Ev) -> Out;
}
