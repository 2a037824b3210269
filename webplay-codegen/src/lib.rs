use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use quote::quote_spanned;
use std::path::Path;

/// Turns a function into a test that replays a recorded scenario file and fails on the first
/// assertion that does not hold.
///
/// ```ignore
/// #[webplay_replay_test("scenarios/login.xml", configure_replay)]
/// fn login_form_is_unchanged() {}
/// ```
///
/// The scenario path is relative to the crate's manifest directory. The function body runs
/// before the replay and its value is kept alive until the replay has finished, so it can
/// return a guard for the application under test.
#[proc_macro_attribute]
pub fn webplay_replay_test(attrs: TokenStream, item: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(item as syn::ItemFn);
    let args = syn::parse_macro_input!(attrs as syn::AttributeArgs);

    let (scenario_path, configuration_function) = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(error) => return error.into(),
    };

    let attributes = &input.attrs;
    let signature = &input.sig;
    let block = &input.block;

    let output = quote! {
        #[test]
        #(#attributes)*
        #signature {
            let mut __webplay_configuration = webplay::ReplayConfiguration::default();
            #configuration_function(&mut __webplay_configuration);

            let __webplay_source = webplay::ScenarioSource::path(
                std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(#scenario_path)
            );
            let __webplay_result = {
                let __webplay_fixture = #block;

                webplay::Replayer::new(__webplay_configuration).replay_blocking(
                    &__webplay_source,
                    &mut |message: &str, expected: &str, actual: Option<&str>| {
                        assert_eq!(Some(expected), actual, "{}", message)
                    },
                )
            };

            if let Err(e) = __webplay_result {
                panic!("Webplay Error: {}", e);
            }
        }
    };

    TokenStream::from(output)
}

fn parse_args(args: &[syn::NestedMeta]) -> Result<(String, &syn::Path), proc_macro2::TokenStream> {
    let (path_arg, function_arg) = match args {
        [path_arg, function_arg] => (path_arg, function_arg),
        _ => {
            return Err(quote! {
                compile_error!("A scenario path and a configuration function should be passed to the macro");
            })
        }
    };

    let scenario_path = match path_arg {
        syn::NestedMeta::Lit(syn::Lit::Str(literal)) => {
            validate_scenario_path(literal.value(), literal.span())?
        }
        _ => {
            return Err(quote! {
                compile_error!("The first argument should be a string literal!");
            })
        }
    };

    match function_arg {
        syn::NestedMeta::Meta(syn::Meta::Path(function_path)) => Ok((scenario_path, function_path)),
        _ => Err(quote! {
            compile_error!("The second argument should be a configuration function!");
        }),
    }
}

fn validate_scenario_path(path: String, span: Span) -> Result<String, proc_macro2::TokenStream> {
    let is_xml = Path::new(&path)
        .extension()
        .map_or(false, |extension| extension == "xml");

    if !is_xml {
        return Err(quote_spanned! {span=>
            compile_error!("The scenario path should point to a .xml file!");
        });
    }

    Ok(path)
}
