use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, ItemFn, LitStr, Pat, Signature, Type};

/// Transform an asynchronous test into a synchronous one and inject
/// dependencies backed by a fresh in-memory ledger.
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`],
/// `crate::store::MemoryWorldState` (the ledger's world state) and
/// `crate::clock::SimulatedClock` (the ledger's clock). The clock starts at
/// the default seed election's start unless an RFC 3339 instant is given,
/// e.g. `#[ledger_test("2020-11-04T00:00:00Z")]`.
#[proc_macro_attribute]
pub fn ledger_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract the injected arguments and reject invalid function signatures.
    let test_args = match check_sig(
        &item_fn.sig,
        &[
            ("Client", quote! { rocket_client }),
            ("MemoryWorldState", quote! { world_state.clone() }),
            ("SimulatedClock", quote! { clock.clone() }),
        ],
    ) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Pick the clock's starting instant.
    let start = if args.is_empty() {
        quote! { crate::workflow::SeedData::default().election.start_date }
    } else {
        let instant = parse_macro_input!(args as LitStr);
        quote! {
            #instant
                .parse::<chrono::DateTime<chrono::Utc>>()
                .expect("Test clock start must be an RFC 3339 instant")
        }
    };

    // Rename the future so the test keeps its declared name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    // Rewrite the test function.
    quote! {
        #[test]
        fn #name() {
            /// Test setup.
            async fn setup(
                now: chrono::DateTime<chrono::Utc>,
            ) -> (
                rocket::local::asynchronous::Client,
                crate::store::MemoryWorldState,
                crate::clock::SimulatedClock,
            ) {
                log4rs_test_utils::test_logging::init_logging_once_for(["vote_ledger"], None, None);

                let world_state = crate::store::MemoryWorldState::new();
                let clock = crate::clock::SimulatedClock::new(now);
                let contract = crate::workflow::VoteContract::new(
                    std::sync::Arc::new(clock.clone()),
                    crate::workflow::SeedData::default(),
                );
                let ledger = crate::ledger::Ledger::new(
                    std::sync::Arc::new(world_state.clone()),
                    contract,
                );
                let rocket_client =
                    rocket::local::asynchronous::Client::tracked(crate::rocket_for_ledger(ledger))
                        .await
                        .unwrap();

                (rocket_client, world_state, clock)
            }

            /// The test itself.
            #item_fn

            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();

            #[allow(unused_variables)]
            let (rocket_client, world_state, clock) = runtime.block_on(setup(#start));
            runtime.block_on(#new_name(#(#test_args),*));
        }
    }
    .into()
}

/// Provides a `crate::store::MongoWorldState` and a [`mongodb::Database`] to
/// an asynchronous test, and drops the database WHETHER OR NOT the test
/// passes.
///
/// The database is reached through `db_uri` in `Rocket.toml` or
/// `ROCKET_DB_URI`; when neither is set the test logs a warning and passes
/// without running. Commits need the server to be part of a replica set.
///
/// Note: this attribute requires `crate::mongo_world_state` to be defined.
#[proc_macro_attribute]
pub fn db_test(_: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    let test_args = match check_sig(
        &item_fn.sig,
        &[
            ("MongoWorldState", quote! { world_state }),
            ("Database", quote! { db.clone() }),
        ],
    ) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    quote! {
        #[test]
        fn #name() {
            /// The test itself.
            #item_fn

            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                log4rs_test_utils::test_logging::init_logging_once_for(["vote_ledger"], None, None);

                #[allow(unused_variables)]
                let Some((world_state, db)) = crate::mongo_world_state(stringify!(#name)).await else {
                    return;
                };

                let result = rocket::futures::FutureExt::catch_unwind(
                    std::panic::AssertUnwindSafe(#new_name(#(#test_args),*)),
                )
                .await;

                db.drop(None).await.unwrap();

                if let Err(cause) = result {
                    std::panic::resume_unwind(cause);
                }
            });
        }
    }
    .into()
}

/// Ensure the wrapped test is async, map each parameter to the value to inject,
/// and reject unknown or repeated parameters.
///
/// `injectable` pairs the last segment of each accepted parameter type with
/// the expression passed for it.
fn check_sig(
    sig: &Signature,
    injectable: &[(&str, TokenStream2)],
) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut seen = Vec::new();
    let mut args = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
                // The last path segment names the type, however it was imported.
                if let Some(segment) = type_path.path.segments.last() {
                    let injected = injectable
                        .iter()
                        .find(|(type_name, _)| segment.ident == type_name);

                    if let Some((type_name, injected)) = injected {
                        if seen.contains(type_name) {
                            return Err(syn::Error::new(
                                input.span(),
                                format!("Test cannot accept more than one `{type_name}`"),
                            ));
                        }
                        seen.push(*type_name);
                        args.push(injected.clone());
                        continue;
                    }
                }
            }
        }

        let expected = injectable
            .iter()
            .map(|(type_name, _)| format!("`{type_name}`"))
            .collect::<Vec<_>>()
            .join(", ");
        return Err(syn::Error::new(
            input.span(),
            format!("Expected only arguments of type {expected}"),
        ));
    }

    Ok(args)
}
