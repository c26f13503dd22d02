//! Filter expression parser.
//!
//! Grammar (operator precedence: NOT > AND > OR):
//! ```text
//! filter     = expr
//! expr       = term (("or" | "||") term)*
//! term       = factor (("and" | "&&") factor)*
//! factor     = ("not" | "!") factor | "(" expr ")" | primitive
//! primitive  = proto | net | portrange | port | host | protocol
//! ```

use std::net::Ipv4Addr;

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, tag_no_case},
    character::complete::{char, digit1, multispace0, multispace1},
    combinator::{all_consuming, map, map_res, opt, recognize, value},
    multi::many0,
    sequence::{delimited, pair, preceded, separated_pair, terminated, tuple},
};

use super::ast::{Cidr, Direction, FilterExpr, Primitive, Protocol};
use super::error::FilterError;

pub fn parse_filter(input: &str) -> Result<FilterExpr, FilterError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(FilterError::Empty);
    }

    match all_consuming(expr)(trimmed) {
        Ok((_, expr)) => Ok(expr),
        Err(e) => Err(FilterError::Parse {
            expression: trimmed.to_string(),
            message: e.to_string(),
        }),
    }
}

fn expr(input: &str) -> IResult<&str, FilterExpr> {
    let (input, first) = term(input)?;
    let (input, rest) = many0(preceded(or_op, term))(input)?;
    Ok((input, rest.into_iter().fold(first, FilterExpr::or)))
}

fn term(input: &str) -> IResult<&str, FilterExpr> {
    let (input, first) = factor(input)?;
    let (input, rest) = many0(preceded(and_op, factor))(input)?;
    Ok((input, rest.into_iter().fold(first, FilterExpr::and)))
}

fn factor(input: &str) -> IResult<&str, FilterExpr> {
    alt((not_expr, paren_expr, primitive_expr))(input)
}

fn or_op(input: &str) -> IResult<&str, ()> {
    value(
        (),
        preceded(
            multispace0,
            alt((
                terminated(tag_no_case("or"), multispace1),
                terminated(tag("||"), multispace0),
            )),
        ),
    )(input)
}

fn and_op(input: &str) -> IResult<&str, ()> {
    value(
        (),
        preceded(
            multispace0,
            alt((
                terminated(tag_no_case("and"), multispace1),
                terminated(tag("&&"), multispace0),
            )),
        ),
    )(input)
}

fn not_expr(input: &str) -> IResult<&str, FilterExpr> {
    let (input, _) = alt((
        terminated(tag_no_case("not"), multispace1),
        terminated(tag("!"), multispace0),
    ))(input)?;
    let (input, expr) = factor(input)?;
    Ok((input, FilterExpr::negate(expr)))
}

fn paren_expr(input: &str) -> IResult<&str, FilterExpr> {
    delimited(
        pair(char('('), multispace0),
        expr,
        pair(multispace0, char(')')),
    )(input)
}

fn primitive_expr(input: &str) -> IResult<&str, FilterExpr> {
    map(primitive, FilterExpr::Primitive)(input)
}

fn primitive(input: &str) -> IResult<&str, Primitive> {
    alt((
        proto_filter,
        net_filter,
        portrange_filter,
        port_filter,
        host_filter,
        map(protocol, Primitive::Protocol),
    ))(input)
}

fn protocol(input: &str) -> IResult<&str, Protocol> {
    alt((
        value(Protocol::Tcp, tag_no_case("tcp")),
        value(Protocol::Udp, tag_no_case("udp")),
        value(Protocol::Icmp, tag_no_case("icmp")),
        value(Protocol::Ip6, tag_no_case("ip6")),
        value(Protocol::Ip, tag_no_case("ip")),
    ))(input)
}

fn host_filter(input: &str) -> IResult<&str, Primitive> {
    let (input, direction) = opt(terminated(direction, multispace1))(input)?;
    let (input, _) = terminated(tag_no_case("host"), multispace1)(input)?;
    let (input, address) = ipv4_addr(input)?;
    Ok((
        input,
        Primitive::Host {
            direction: direction.unwrap_or_default(),
            address,
        },
    ))
}

fn net_filter(input: &str) -> IResult<&str, Primitive> {
    let (input, direction) = opt(terminated(direction, multispace1))(input)?;
    let (input, _) = terminated(tag_no_case("net"), multispace1)(input)?;
    let (input, cidr) = cidr(input)?;
    Ok((
        input,
        Primitive::Net {
            direction: direction.unwrap_or_default(),
            cidr,
        },
    ))
}

fn port_filter(input: &str) -> IResult<&str, Primitive> {
    let (input, direction) = opt(terminated(direction, multispace1))(input)?;
    let (input, protocol) = opt(terminated(transport_protocol, multispace1))(input)?;
    let (input, _) = terminated(tag_no_case("port"), multispace1)(input)?;
    let (input, port) = port_number(input)?;
    Ok((
        input,
        Primitive::Port {
            direction: direction.unwrap_or_default(),
            protocol,
            port,
        },
    ))
}

fn portrange_filter(input: &str) -> IResult<&str, Primitive> {
    let (input, direction) = opt(terminated(direction, multispace1))(input)?;
    let (input, protocol) = opt(terminated(transport_protocol, multispace1))(input)?;
    let (input, _) = terminated(tag_no_case("portrange"), multispace1)(input)?;
    let (rest, (start, end)) = separated_pair(port_number, char('-'), port_number)(input)?;
    if start > end {
        return Err(verify_error(input));
    }
    Ok((
        rest,
        Primitive::PortRange {
            direction: direction.unwrap_or_default(),
            protocol,
            start,
            end,
        },
    ))
}

fn proto_filter(input: &str) -> IResult<&str, Primitive> {
    let (input, _) = terminated(tag_no_case("proto"), multispace1)(input)?;
    let (input, number) = map_res(digit1, |s: &str| s.parse::<u8>())(input)?;
    Ok((input, Primitive::Proto(number)))
}

fn direction(input: &str) -> IResult<&str, Direction> {
    alt((
        value(Direction::Src, tag_no_case("src")),
        value(Direction::Dst, tag_no_case("dst")),
    ))(input)
}

fn transport_protocol(input: &str) -> IResult<&str, Protocol> {
    alt((
        value(Protocol::Tcp, tag_no_case("tcp")),
        value(Protocol::Udp, tag_no_case("udp")),
    ))(input)
}

fn ipv4_addr(input: &str) -> IResult<&str, Ipv4Addr> {
    map_res(
        recognize(tuple((
            digit1,
            char('.'),
            digit1,
            char('.'),
            digit1,
            char('.'),
            digit1,
        ))),
        |s: &str| s.parse::<Ipv4Addr>(),
    )(input)
}

fn cidr(input: &str) -> IResult<&str, Cidr> {
    let (rest, (address, prefix_len)) = separated_pair(
        ipv4_addr,
        char('/'),
        map_res(digit1, |s: &str| s.parse::<u8>()),
    )(input)?;
    if prefix_len > 32 {
        return Err(verify_error(input));
    }
    Ok((
        rest,
        Cidr {
            address,
            prefix_len,
        },
    ))
}

fn port_number(input: &str) -> IResult<&str, u16> {
    map_res(digit1, |s: &str| s.parse::<u16>())(input)
}

fn verify_error(input: &str) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Verify,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prim(p: Primitive) -> FilterExpr {
        FilterExpr::Primitive(p)
    }

    #[test]
    fn protocols() {
        assert_eq!(parse_filter("tcp").unwrap(), prim(Primitive::Protocol(Protocol::Tcp)));
        assert_eq!(parse_filter("UDP").unwrap(), prim(Primitive::Protocol(Protocol::Udp)));
        assert_eq!(parse_filter("ip6").unwrap(), prim(Primitive::Protocol(Protocol::Ip6)));
        assert_eq!(parse_filter("ip").unwrap(), prim(Primitive::Protocol(Protocol::Ip)));
        assert_eq!(parse_filter("proto 47").unwrap(), prim(Primitive::Proto(47)));
    }

    #[test]
    fn dns_source_filter() {
        assert_eq!(
            parse_filter("udp and port 53").unwrap(),
            FilterExpr::and(
                prim(Primitive::Protocol(Protocol::Udp)),
                prim(Primitive::Port {
                    direction: Direction::SrcOrDst,
                    protocol: None,
                    port: 53,
                }),
            )
        );
    }

    #[test]
    fn qualified_primitives() {
        assert_eq!(
            parse_filter("dst tcp port 443").unwrap(),
            prim(Primitive::Port {
                direction: Direction::Dst,
                protocol: Some(Protocol::Tcp),
                port: 443,
            })
        );
        assert_eq!(
            parse_filter("src host 10.0.0.1").unwrap(),
            prim(Primitive::Host {
                direction: Direction::Src,
                address: Ipv4Addr::new(10, 0, 0, 1),
            })
        );
        assert_eq!(
            parse_filter("net 192.168.0.0/16").unwrap(),
            prim(Primitive::Net {
                direction: Direction::SrcOrDst,
                cidr: Cidr {
                    address: Ipv4Addr::new(192, 168, 0, 0),
                    prefix_len: 16,
                },
            })
        );
        assert_eq!(
            parse_filter("udp portrange 1024-2048").unwrap(),
            prim(Primitive::PortRange {
                direction: Direction::SrcOrDst,
                protocol: Some(Protocol::Udp),
                start: 1024,
                end: 2048,
            })
        );
    }

    #[test]
    fn precedence_not_and_or() {
        let tcp = prim(Primitive::Protocol(Protocol::Tcp));
        let udp = prim(Primitive::Protocol(Protocol::Udp));
        let icmp = prim(Primitive::Protocol(Protocol::Icmp));

        assert_eq!(
            parse_filter("tcp or udp and icmp").unwrap(),
            FilterExpr::or(tcp.clone(), FilterExpr::and(udp.clone(), icmp.clone()))
        );
        assert_eq!(
            parse_filter("(tcp || udp) && !icmp").unwrap(),
            FilterExpr::and(
                FilterExpr::or(tcp.clone(), udp.clone()),
                FilterExpr::negate(icmp.clone())
            )
        );
        assert_eq!(
            parse_filter("not tcp and udp").unwrap(),
            FilterExpr::and(FilterExpr::negate(tcp), udp)
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(parse_filter("   "), Err(FilterError::Empty));
        for bad in [
            "tcp and",
            "port 70000",
            "host 300.0.0.1",
            "net 10.0.0.0/33",
            "portrange 90-80",
            "(tcp",
            "bogus",
        ] {
            assert!(
                matches!(parse_filter(bad), Err(FilterError::Parse { .. })),
                "{bad}"
            );
        }
    }
}
