//! ABI encoding of constructor and method arguments.
//!
//! Arguments reach this module as strings (literals from the configuration,
//! rendered addresses, chain ids) and are coerced against the parameter types
//! declared in the artifact's JSON ABI.

use alloy_core::{
    dyn_abi::{DynSolType, DynSolValue, JsonAbiExt, Specifier},
    json_abi::{Function, JsonAbi, Param},
    primitives::{Bytes, keccak256},
};
use anyhow::{Context, Result};

/// Coerce string arguments against a list of ABI parameters.
pub fn coerce_args(params: &[Param], args: &[String]) -> Result<Vec<DynSolValue>> {
    if params.len() != args.len() {
        anyhow::bail!(
            "Expected {} argument(s), got {}",
            params.len(),
            args.len()
        );
    }

    params
        .iter()
        .zip(args)
        .map(|(param, arg)| {
            let ty: DynSolType = param
                .resolve()
                .with_context(|| format!("Unsupported ABI type `{}`", param.ty))?;
            ty.coerce_str(arg).with_context(|| {
                format!(
                    "Cannot use `{}` as `{}` for parameter `{}`",
                    arg, param.ty, param.name
                )
            })
        })
        .collect()
}

/// Number of constructor parameters declared by an ABI.
pub fn constructor_arity(abi: &JsonAbi) -> usize {
    abi.constructor.as_ref().map_or(0, |c| c.inputs.len())
}

/// Concatenate init bytecode with ABI-encoded constructor arguments.
pub fn encode_deployment(abi: &JsonAbi, bytecode: &[u8], args: &[String]) -> Result<Bytes> {
    let mut init_code = bytecode.to_vec();

    match &abi.constructor {
        Some(constructor) => {
            let values = coerce_args(&constructor.inputs, args)?;
            let encoded = constructor
                .abi_encode_input(&values)
                .context("Failed to encode constructor arguments")?;
            init_code.extend_from_slice(&encoded);
        }
        None if !args.is_empty() => {
            anyhow::bail!("Contract has no constructor but {} argument(s) were given", args.len());
        }
        None => {}
    }

    Ok(init_code.into())
}

/// Find a function by name, or by full signature (`setA(address)`) when overloaded.
pub fn find_function<'a>(abi: &'a JsonAbi, method: &str) -> Result<&'a Function> {
    if method.contains('(') {
        return abi
            .functions()
            .find(|function| function.signature() == method)
            .with_context(|| format!("No function with signature `{method}`"));
    }

    match abi.function(method).map(Vec::as_slice) {
        Some([function]) => Ok(function),
        Some(overloads) if !overloads.is_empty() => anyhow::bail!(
            "`{method}` is overloaded ({}); use a full signature",
            overloads
                .iter()
                .map(Function::signature)
                .collect::<Vec<_>>()
                .join(", ")
        ),
        _ => anyhow::bail!("No function named `{method}`"),
    }
}

/// Encode a call to `function` with string arguments.
pub fn encode_call(function: &Function, args: &[String]) -> Result<Bytes> {
    let values = coerce_args(&function.inputs, args)?;
    let calldata = function
        .abi_encode_input(&values)
        .with_context(|| format!("Failed to encode call to `{}`", function.signature()))?;
    Ok(calldata.into())
}

/// Calldata for an argument-less call identified only by its signature.
pub fn selector_calldata(signature: &str) -> Result<Bytes> {
    if !signature.ends_with("()") {
        anyhow::bail!("`{signature}` must be a full signature without parameters, e.g. `pairCodeHash()`");
    }
    Ok(Bytes::copy_from_slice(&keccak256(signature.as_bytes())[..4]))
}
