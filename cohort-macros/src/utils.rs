use proc_macro::{TokenStream, TokenTree};

/// Breaks the macro input at top-level commas.
///
/// Delimited groups arrive as a single `TokenTree`, so commas nested in
/// calls, blocks or brackets stay inside their argument. Closure
/// parameter lists and turbofish generics are not groups: arguments
/// containing them must be parenthesized. Empty arguments (a trailing
/// comma) are skipped.
pub(crate) fn split_args(input: TokenStream) -> Vec<Vec<TokenTree>> {
    let mut args = Vec::new();
    let mut arg = Vec::new();

    for token in input {
        if matches!(&token, TokenTree::Punct(punct) if punct.as_char() == ',') {
            args.push(std::mem::take(&mut arg));
        } else {
            arg.push(token);
        }
    }

    args.push(arg);
    args.retain(|arg: &Vec<TokenTree>| !arg.is_empty());
    args
}

/// Converts a slice of tokens back into Rust source.
///
/// Goes through `TokenStream`'s own printer, which keeps joint
/// punctuation (`=>`, `::`, lifetimes) intact.
pub(crate) fn tokens_to_string(tokens: &[TokenTree]) -> String {
    tokens.iter().cloned().collect::<TokenStream>().to_string()
}

/// Position of the first `=>` in `tokens`.
fn find_arrow(tokens: &[TokenTree]) -> Option<usize> {
    tokens.windows(2).position(|pair| match pair {
        [TokenTree::Punct(eq), TokenTree::Punct(gt)] => eq.as_char() == '=' && gt.as_char() == '>',
        _ => false,
    })
}

/// Parses `promise => handler` branches separated by commas.
///
/// Returns `(promise, handler)` source pairs. A branch without an arrow
/// or with an empty side is an error naming the offending branch.
pub(crate) fn parse_select_branches(input: TokenStream) -> Result<Vec<(String, String)>, String> {
    let mut parsed = Vec::new();

    for (index, tokens) in split_args(input).into_iter().enumerate() {
        let Some(arrow) = find_arrow(&tokens) else {
            return Err(format!("select! branch {index} is missing `=>`"));
        };

        let promise = tokens_to_string(&tokens[..arrow]);
        let handler = tokens_to_string(&tokens[arrow + 2..]);

        if promise.trim().is_empty() || handler.trim().is_empty() {
            return Err(format!("select! branch {index} needs a promise and a handler"));
        }

        parsed.push((promise, handler));
    }

    Ok(parsed)
}

/// Parses generated source, turning a parse failure into a
/// `compile_error!` attributed to `macro_name`.
pub(crate) fn finish(macro_name: &str, source: String) -> TokenStream {
    source
        .parse()
        .unwrap_or_else(|err| compile_error(&format!("{macro_name} macro error: {err}")))
}

pub(crate) fn compile_error(message: &str) -> TokenStream {
    format!("compile_error!({message:?});")
        .parse()
        .unwrap_or_default()
}
