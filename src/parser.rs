use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_until, take_while1},
    character::complete::{char, digit1, multispace0, multispace1},
    combinator::{map_res, opt, rest, value, verify},
    sequence::{delimited, preceded, tuple},
    IResult,
};

#[derive(Debug, PartialEq, Clone)]
pub enum Command {
    /// Raw JSON payload typed inline.
    Send { payload: String },
    SendFile { path: String },
    History { limit: Option<usize> },
    Latest { client: Option<String> },
    Status,
    Reset,
    Start,
    Stop,
    Help,
    Exit,
}

// --- BASIC PARSERS ---

fn parse_usize(input: &str) -> IResult<&str, usize> {
    map_res(digit1, |s: &str| s.parse::<usize>())(input)
}

fn parse_quoted_string(input: &str) -> IResult<&str, String> {
    let (input, _) = char('"')(input)?;
    let (input, content) = take_until("\"")(input)?;
    let (input, _) = char('"')(input)?;
    Ok((input, content.to_string()))
}

fn parse_quoted_id(input: &str) -> IResult<&str, &str> {
    delimited(char('\''), take_until("'"), char('\''))(input)
}

fn parse_bare_id(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| !c.is_whitespace())(input)
}

fn parse_client_id(input: &str) -> IResult<&str, String> {
    let (input, id) = alt((parse_quoted_id, parse_bare_id))(input)?;
    Ok((input, id.to_string()))
}

fn parse_payload(input: &str) -> IResult<&str, &str> {
    verify(rest, |s: &str| !s.trim().is_empty())(input)
}

// --- HELPERS ---
fn ws<'a, F, O, E: nom::error::ParseError<&'a str>>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O, E>
where F: FnMut(&'a str) -> IResult<&'a str, O, E> {
    delimited(multispace0, inner, multispace0)
}

fn tag_ci(t: &'static str) -> impl FnMut(&str) -> IResult<&str, &str> {
    move |input| tag_no_case(t)(input)
}

// --- COMMAND PARSERS ---

fn parse_send_file(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("SEND")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, _) = tag_ci("FILE")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, path) = parse_quoted_string(input)?;
    Ok((input, Command::SendFile { path }))
}

/// Everything after `SEND` is the payload, verbatim.
fn parse_send(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("SEND")(input)?;
    let (input, _) = multispace1(input)?;
    let (input, payload) = parse_payload(input)?;
    Ok((input, Command::Send { payload: payload.trim().to_string() }))
}

fn parse_history(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("HISTORY")(input)?;
    let (input, limit) = opt(preceded(
        tuple((multispace1, tag_ci("LIMIT"), multispace1)),
        parse_usize,
    ))(input)?;
    Ok((input, Command::History { limit }))
}

fn parse_latest(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_ci("LATEST")(input)?;
    let (input, client) = opt(preceded(multispace1, parse_client_id))(input)?;
    Ok((input, Command::Latest { client }))
}

fn parse_keyword(input: &str) -> IResult<&str, Command> {
    alt((
        value(Command::Status, tag_ci("STATUS")),
        value(Command::Reset, tag_ci("RESET")),
        value(Command::Start, tag_ci("START")),
        value(Command::Stop, tag_ci("STOP")),
        value(Command::Help, tag_ci("HELP")),
        value(Command::Exit, alt((tag_ci("EXIT"), tag_ci("QUIT")))),
    ))(input)
}

pub fn parse_command(input: &str) -> Result<Command, String> {
    let input = input.trim();
    let result = ws(alt((
        parse_send_file,
        parse_send,
        parse_history,
        parse_latest,
        parse_keyword,
    )))(input);

    match result {
        Ok((remainder, cmd)) => {
            if !remainder.trim().is_empty() {
                return Err(format!("Unexpected tokens at end: '{}'", remainder));
            }
            Ok(cmd)
        },
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            let context: String = e.input.chars().take(20).collect();
            if context.len() < e.input.len() {
                Err(format!("Invalid syntax near: '{}...'", context))
            } else {
                Err(format!("Invalid syntax near: '{}'", context))
            }
        },
        Err(nom::Err::Incomplete(_)) => Err("Incomplete command.".to_string()),
    }
}
