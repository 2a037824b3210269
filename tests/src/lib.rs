#[cfg(test)]
mod tests {
    mod macros;
    mod recording;
    mod replay;
    mod support;
}
