//! Text rewrites applied to a freshly bootstrapped checkout.

/// Replace every occurrence of `token` with `path` as a double-quoted YAML scalar.
/// Returns the new text and how many replacements were made.
pub fn substitute_source_token(contents: &str, token: &str, path: &str) -> (String, usize) {
    let count = contents.matches(token).count();
    let escaped = path.replace('\\', "\\\\").replace('"', "\\\"");
    let quoted = format!("\"{escaped}\"");
    (contents.replace(token, &quoted), count)
}

/// Why [`nest_resource_block`] could not rewrite a definition file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NestError {
    /// No `Vagrant.configure(...) do |config|` line.
    NoConfigureBlock,
    /// The configure block is never closed with `end`.
    Unterminated,
}

/// Wrap the body of the top-level configure block in a named machine
/// definition, so the driver knows the machine by `name`:
///
/// ```text
/// Vagrant.configure("2") do |config|        Vagrant.configure("2") do |config|
///   config.vm.box = "laravel/homestead"  =>   config.vm.define "homestead" do |homestead|
/// end                                           homestead.vm.box = "laravel/homestead"
///                                             end
///                                           end
/// ```
///
/// Returns `Ok(None)` when the file already defines `name`.
pub fn nest_resource_block(contents: &str, name: &str) -> Result<Option<String>, NestError> {
    if defines_machine(contents, name) {
        return Ok(None);
    }

    let lines: Vec<&str> = contents.lines().collect();
    let open = lines
        .iter()
        .position(|l| is_configure_open(l))
        .ok_or(NestError::NoConfigureBlock)?;
    let close = lines
        .iter()
        .rposition(|l| l.trim() == "end")
        .filter(|&i| i > open)
        .ok_or(NestError::Unterminated)?;

    let indent = leading_whitespace(lines[open]);
    let mut out: Vec<String> = lines[..=open].iter().map(|l| l.to_string()).collect();
    out.push(format!("{indent}  config.vm.define \"{name}\" do |{name}|"));
    for line in &lines[open + 1..close] {
        if line.trim().is_empty() {
            out.push(String::new());
        } else {
            out.push(format!("  {}", rewrite_prefix(line, name)));
        }
    }
    out.push(format!("{indent}  end"));
    out.extend(lines[close..].iter().map(|l| l.to_string()));

    let mut rewritten = out.join("\n");
    if contents.ends_with('\n') {
        rewritten.push('\n');
    }
    Ok(Some(rewritten))
}

fn is_configure_open(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with("Vagrant.configure") && trimmed.contains("|config|")
}

fn defines_machine(contents: &str, name: &str) -> bool {
    contents.contains(&format!("config.vm.define \"{name}\""))
        || contents.contains(&format!("config.vm.define '{name}'"))
        || contents.contains(&format!("config.vm.define :{name}"))
}

fn leading_whitespace(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}

/// `  config.vm.box = x` -> `  homestead.vm.box = x`
fn rewrite_prefix(line: &str, name: &str) -> String {
    let indent = leading_whitespace(line);
    match line.trim_start().strip_prefix("config.") {
        Some(rest) => format!("{indent}{name}.{rest}"),
        None => line.to_string(),
    }
}
