//! `setTimeout` and `setInterval` for a sandbox realm.
//!
//! Timers queue on the sandbox thread and fire only while the host waits
//! for a test's promise to settle, between runs of the job queue.

use std::cell::RefCell;
use std::time::{Duration, Instant};

use boa_engine::{js_string, Context, JsArgs, JsNativeError, JsObject, JsResult, JsValue, NativeFunction};

/// Longest delay a timer accepts, as in browsers.
const MAX_DELAY_MS: f64 = i32::MAX as f64;

struct Timer {
    id: u32,
    due: Instant,
    /// Tie-break for timers due at the same instant.
    seq: u64,
    callback: JsObject,
    args: Vec<JsValue>,
    repeat: Option<Duration>,
}

#[derive(Default)]
struct TimerQueue {
    next_id: u32,
    next_seq: u64,
    timers: Vec<Timer>,
}

impl TimerQueue {
    fn schedule(&mut self, callback: JsObject, args: Vec<JsValue>, delay: Duration, repeat: bool) -> u32 {
        self.next_id += 1;
        let id = self.next_id;
        self.push(id, callback, args, delay, repeat.then_some(delay));
        id
    }

    fn push(&mut self, id: u32, callback: JsObject, args: Vec<JsValue>, delay: Duration, repeat: Option<Duration>) {
        self.next_seq += 1;
        self.timers.push(Timer {
            id,
            due: Instant::now() + delay,
            seq: self.next_seq,
            callback,
            args,
            repeat,
        });
    }

    fn earliest(&self) -> Option<usize> {
        self.timers
            .iter()
            .enumerate()
            .min_by_key(|(_, timer)| (timer.due, timer.seq))
            .map(|(index, _)| index)
    }
}

thread_local! {
    static TIMERS: RefCell<TimerQueue> = RefCell::new(TimerQueue::default());
}

/// Drops every queued timer when the realm is done with them.
pub(crate) struct TimerGuard;

impl Drop for TimerGuard {
    fn drop(&mut self) {
        TIMERS.with(|queue| queue.borrow_mut().timers.clear());
    }
}

pub(crate) fn register(context: &mut Context) -> JsResult<TimerGuard> {
    context.register_global_callable(js_string!("setTimeout"), 1, NativeFunction::from_fn_ptr(set_timeout))?;
    context.register_global_callable(js_string!("setInterval"), 1, NativeFunction::from_fn_ptr(set_interval))?;
    context.register_global_callable(js_string!("clearTimeout"), 1, NativeFunction::from_fn_ptr(clear_timer))?;
    context.register_global_callable(js_string!("clearInterval"), 1, NativeFunction::from_fn_ptr(clear_timer))?;
    Ok(TimerGuard)
}

fn set_timeout(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    schedule(args, false, context)
}

fn set_interval(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    schedule(args, true, context)
}

fn schedule(args: &[JsValue], repeat: bool, context: &mut Context) -> JsResult<JsValue> {
    let callback = args
        .get_or_undefined(0)
        .as_callable()
        .cloned()
        .ok_or_else(|| JsNativeError::typ().with_message("timer callback must be a function"))?;
    let millis = args.get_or_undefined(1).to_number(context)?;
    let delay = if millis.is_finite() && millis > 0.0 {
        Duration::from_secs_f64(millis.min(MAX_DELAY_MS) / 1000.0)
    } else {
        Duration::ZERO
    };
    let extra = args.iter().skip(2).cloned().collect();

    let id = TIMERS.with(|queue| queue.borrow_mut().schedule(callback, extra, delay, repeat));
    Ok(JsValue::from(id))
}

fn clear_timer(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let id = args.get_or_undefined(0).to_number(context)?;
    TIMERS.with(|queue| queue.borrow_mut().timers.retain(|timer| f64::from(timer.id) != id));
    Ok(JsValue::undefined())
}

/// When the next timer is due, if any is queued.
pub(crate) fn next_due() -> Option<Instant> {
    TIMERS.with(|queue| {
        let queue = queue.borrow();
        queue.earliest().map(|index| queue.timers[index].due)
    })
}

/// Runs the earliest timer if it is due. An interval is re-queued before
/// its callback runs, so the callback can clear it. Returns whether a
/// timer fired.
pub(crate) fn fire_due(context: &mut Context) -> bool {
    let timer = TIMERS.with(|queue| {
        let mut queue = queue.borrow_mut();
        let index = queue.earliest().filter(|&index| queue.timers[index].due <= Instant::now())?;
        let timer = queue.timers.swap_remove(index);
        if let Some(interval) = timer.repeat {
            queue.push(timer.id, timer.callback.clone(), timer.args.clone(), interval, Some(interval));
        }
        Some(timer)
    });
    let Some(timer) = timer else {
        return false;
    };

    if let Err(err) = timer.callback.call(&JsValue::undefined(), &timer.args, context) {
        log::debug!("timer {} threw: {}", timer.id, err);
    }
    true
}
