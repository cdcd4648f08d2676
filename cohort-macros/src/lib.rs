//! Procedural macros for the `cohort` promise executor.
//!
//! Every macro expands to a plain promise (a closure returning `Poll`)
//! and refers to the runtime through absolute `::cohort` paths, so the
//! `cohort` crate must be reachable under that name.

mod utils;

use proc_macro::TokenStream;

/// Polls every promise until all are ready and resolves to a tuple of
/// their results, in argument order.
///
/// A single promise resolves to a 1-tuple, no promise resolves to `()`.
///
/// ```rust,ignore
/// let both = join!(fetch_header(), fetch_body());
/// ```
#[proc_macro]
pub fn join(input: TokenStream) -> TokenStream {
    let args = utils::split_args(input);
    let count = args.len();

    if count == 0 {
        return utils::finish("join!", "::cohort::promise::immediate(())".to_string());
    }

    let mut out = String::from("{\n");

    for (i, expr_tokens) in args.iter().enumerate() {
        let expr = utils::tokens_to_string(expr_tokens);
        out.push_str(&format!(
            "let mut __p{i} = ::cohort::combinator::MaybeDone::new({expr});\n"
        ));
    }

    out.push_str("move || {\n");
    out.push_str("    let mut __all_done = true;\n");

    for i in 0..count {
        out.push_str(&format!("    __all_done &= __p{i}.poll_done();\n"));
    }

    out.push_str("    if !__all_done {\n");
    out.push_str("        return ::std::task::Poll::Pending;\n");
    out.push_str("    }\n");
    out.push_str("    ::std::task::Poll::Ready((\n");

    for i in 0..count {
        out.push_str(&format!("        __p{i}.take_output(),\n"));
    }

    out.push_str("    ))\n");
    out.push_str("}\n");
    out.push_str("}\n");

    utils::finish("join!", out)
}

/// Resolves to the result of the first promise that becomes ready.
///
/// Promises are polled in argument order on every round, so when several
/// are ready at once the leftmost one wins. All promises must share the
/// same output type; the losers are dropped with the race.
///
/// ```rust,ignore
/// let outcome = race!(wait_for_ack(), timeout(deadline));
/// ```
#[proc_macro]
pub fn race(input: TokenStream) -> TokenStream {
    let args = utils::split_args(input);

    if args.is_empty() {
        return utils::compile_error("race! needs at least one promise");
    }

    let mut out = String::from("{\n");

    for (i, expr_tokens) in args.iter().enumerate() {
        let expr = utils::tokens_to_string(expr_tokens);
        out.push_str(&format!("let mut __p{i} = {expr};\n"));
    }

    out.push_str("move || {\n");

    for i in 0..args.len() {
        out.push_str(&format!(
            "    if let ::std::task::Poll::Ready(val) = ::cohort::Promise::poll(&mut __p{i}) {{\n\
                     return ::std::task::Poll::Ready(val);\n\
                 }}\n"
        ));
    }

    out.push_str("    ::std::task::Poll::Pending\n");
    out.push_str("}\n");
    out.push_str("}\n");

    utils::finish("race!", out)
}

/// Races promises of different types, mapping the winner through its
/// branch handler.
///
/// ```rust,ignore
/// let event = select! {
///     next_frame() => |frame| Event::Frame(frame),
///     sleep(timeout) => |()| Event::Timeout,
/// };
/// ```
#[proc_macro]
pub fn select(input: TokenStream) -> TokenStream {
    let branches = match utils::parse_select_branches(input) {
        Ok(branches) if branches.is_empty() => {
            return utils::compile_error("select! needs at least one branch");
        }
        Ok(branches) => branches,
        Err(message) => return utils::compile_error(&message),
    };

    let count = branches.len();
    let mut out = String::from("{\n");

    let generics = (0..count)
        .map(|i| format!("__T{i}"))
        .collect::<Vec<_>>()
        .join(", ");

    out.push_str(&format!("enum __SelectResult<{generics}> {{\n"));
    for i in 0..count {
        out.push_str(&format!("    __B{i}(__T{i}),\n"));
    }
    out.push_str("}\n\n");

    for (i, (promise, _handler)) in branches.iter().enumerate() {
        out.push_str(&format!("let mut __p{i} = {promise};\n"));
    }

    out.push_str("\nlet __race = move || {\n");

    for i in 0..count {
        out.push_str(&format!(
            "    if let ::std::task::Poll::Ready(val) = ::cohort::Promise::poll(&mut __p{i}) {{\n\
                     return ::std::task::Poll::Ready(__SelectResult::__B{i}(val));\n\
                 }}\n"
        ));
    }

    out.push_str("    ::std::task::Poll::Pending\n");
    out.push_str("};\n\n");

    out.push_str("::cohort::combinator::map(__race, move |__winner| match __winner {\n");
    for (i, (_promise, handler)) in branches.iter().enumerate() {
        out.push_str(&format!(
            "    __SelectResult::__B{i}(val) => ({handler})(val),\n"
        ));
    }
    out.push_str("})\n");
    out.push_str("}\n");

    utils::finish("select!", out)
}
