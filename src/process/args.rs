use crate::error::{FfmpegError, Result};

pub(crate) fn split_extra_args(extra_args: &str) -> Result<Vec<String>> {
    shlex::split(extra_args).ok_or_else(|| FfmpegError::InvalidExtraArgs(extra_args.to_string()))
}

/// `[binary] + command_args + split(extra_args) + [output]`.
pub(crate) fn build_argument_vector<I, S>(
    binary_path: &str,
    command_args: I,
    extra_args: Option<&str>,
    output: &str,
) -> Result<Vec<String>>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let extra = match extra_args {
        Some(extra_args) => split_extra_args(extra_args)?,
        None => Vec::new(),
    };

    let mut argv = vec![binary_path.to_string()];
    argv.extend(command_args.into_iter().map(Into::into));
    argv.extend(extra);
    argv.push(output.to_string());
    Ok(argv)
}
