//! Native functions a sandbox realm uses to reach the host.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use boa_engine::object::FunctionObjectBuilder;
use boa_engine::property::Attribute;
use boa_engine::{
    js_string, Context, JsArgs, JsError, JsNativeError, JsObject, JsResult, JsString, JsValue, NativeFunction,
};
use tokio::sync::mpsc::UnboundedSender;

use crate::compiler::CHECKPOINT;
use crate::expect::{expect, Matcher, Matchers};
use crate::protocol::{Envelope, Source};

use super::wire;

/// Where a sandbox thread's envelopes go.
pub(crate) struct Outbox {
    tx: UnboundedSender<String>,
    cancelled: Arc<AtomicBool>,
}

impl Outbox {
    pub(crate) fn new(tx: UnboundedSender<String>, cancelled: Arc<AtomicBool>) -> Self {
        Self { tx, cancelled }
    }
}

thread_local! {
    static OUTBOX: RefCell<Option<Outbox>> = RefCell::new(None);
}

/// Installs the thread's outbox for as long as the guard lives.
pub(crate) struct OutboxGuard;

impl OutboxGuard {
    pub(crate) fn install(outbox: Outbox) -> Self {
        OUTBOX.with(|slot| *slot.borrow_mut() = Some(outbox));
        OutboxGuard
    }
}

impl Drop for OutboxGuard {
    fn drop(&mut self) {
        OUTBOX.with(|slot| slot.borrow_mut().take());
    }
}

pub(crate) fn is_cancelled() -> bool {
    OUTBOX.with(|slot| {
        slot.borrow()
            .as_ref()
            .map_or(true, |outbox| outbox.cancelled.load(Ordering::SeqCst))
    })
}

/// Sends an envelope to the host. Returns false once the evaluation is
/// cancelled or the host stopped listening.
pub(crate) fn post(envelope: &Envelope) -> bool {
    let raw = match envelope.encode() {
        Ok(raw) => raw,
        Err(err) => {
            log::warn!("dropping {} envelope: {}", envelope.source, err);
            return false;
        }
    };
    OUTBOX.with(|slot| match slot.borrow().as_ref() {
        Some(outbox) if !outbox.cancelled.load(Ordering::SeqCst) => outbox.tx.send(raw).is_ok(),
        _ => false,
    })
}

pub(crate) fn register(context: &mut Context) -> JsResult<()> {
    context.register_global_callable(js_string!("__hostPost"), 2, NativeFunction::from_fn_ptr(host_post))?;
    context.register_global_callable(js_string!("__hostExpect"), 3, NativeFunction::from_fn_ptr(host_expect))?;

    // Challenge code must not be able to replace or delete it.
    let checkpoint = FunctionObjectBuilder::new(context.realm(), NativeFunction::from_fn_ptr(checkpoint))
        .name(js_string!("__checkpoint"))
        .length(0)
        .build();
    context.register_global_property(
        JsString::from(CHECKPOINT),
        checkpoint,
        Attribute::READONLY | Attribute::NON_ENUMERABLE | Attribute::PERMANENT,
    )?;
    Ok(())
}

/// `__checkpoint()`: throws once the evaluation is cancelled. Every compiled
/// loop iteration and function entry passes through here, so a cancelled
/// realm unwinds even out of code that catches the error.
fn checkpoint(_this: &JsValue, _args: &[JsValue], _context: &mut Context) -> JsResult<JsValue> {
    if is_cancelled() {
        return Err(JsNativeError::error().with_message("evaluation cancelled").into());
    }
    Ok(JsValue::undefined())
}

/// `__hostPost(source, text)`: console output from challenge code.
fn host_post(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let tag = args.get_or_undefined(0).to_string(context)?.to_std_string_escaped();
    let source = Source::parse(&tag).filter(|source| source.is_diagnostic()).ok_or_else(|| {
        JsNativeError::typ().with_message(format!("`{}` is not a console level", tag))
    })?;
    let text = args.get_or_undefined(1).to_string(context)?.to_std_string_escaped();

    if let Ok(envelope) = Envelope::diagnostic(source, &text) {
        post(&envelope);
    }
    Ok(JsValue::undefined())
}

/// `__hostExpect(matcher, negated, payload)`: runs one matcher on the host
/// and throws its failure message back into the realm.
fn host_expect(_this: &JsValue, args: &[JsValue], context: &mut Context) -> JsResult<JsValue> {
    let name = args.get_or_undefined(0).to_string(context)?.to_std_string_escaped();
    let negated = args.get_or_undefined(1).to_boolean();
    let raw = args.get_or_undefined(2).to_string(context)?.to_std_string_escaped();

    let matcher = Matcher::from_name(&name).ok_or_else(|| {
        JsNativeError::typ().with_message(format!("expect(...).{} is not a matcher", name))
    })?;
    let payload = wire::decode_payload(&raw).map_err(|err| {
        JsNativeError::error().with_message(format!("could not read values for {}: {}", name, err))
    })?;

    let expectation = expect(payload.received);
    let result = if negated {
        expectation.not().apply(matcher, &payload.args)
    } else {
        expectation.apply(matcher, &payload.args)
    };

    match result {
        Ok(()) => Ok(JsValue::undefined()),
        Err(err) => Err(JsNativeError::error()
            .with_message(err.message().to_string())
            .into()),
    }
}

/// Renders a thrown value as `Name: message`, followed by its stack when the
/// value carries one.
pub(crate) fn describe_error(err: &JsError, context: &mut Context) -> String {
    match err.as_opaque() {
        Some(value) => describe_thrown(value, context),
        None => err.to_string(),
    }
}

pub(crate) fn describe_thrown(value: &JsValue, context: &mut Context) -> String {
    if let Some(object) = value.as_object() {
        let message = object
            .get(js_string!("message"), context)
            .ok()
            .filter(|message| !message.is_undefined());
        if let Some(message) = message {
            let name = object
                .get(js_string!("name"), context)
                .ok()
                .filter(|name| !name.is_undefined())
                .and_then(|name| name.to_string(context).ok())
                .map(|name| name.to_std_string_escaped())
                .unwrap_or_else(|| "Error".to_string());
            let message = message
                .to_string(context)
                .map(|m| m.to_std_string_escaped())
                .unwrap_or_default();
            let header = if message.is_empty() { name } else { format!("{}: {}", name, message) };
            return match stack_of(object, context) {
                Some(stack) if stack.starts_with(&header) => stack,
                Some(stack) => format!("{}\n{}", header, stack),
                None => header,
            };
        }
    }

    value
        .to_string(context)
        .map(|s| s.to_std_string_escaped())
        .unwrap_or_else(|_| value.display().to_string())
}

fn stack_of(object: &JsObject, context: &mut Context) -> Option<String> {
    let stack = object.get(js_string!("stack"), context).ok()?;
    let stack = stack.as_string()?.to_std_string_escaped();
    let stack = stack.trim_end();
    (!stack.is_empty()).then(|| stack.to_string())
}
